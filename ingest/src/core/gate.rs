//! Registration and trigger gating

use regex::Regex;

use shared::{BridgeConfig, RegisteredGroup};

/// What happened to one feed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not parseable, or missing a sender
    Malformed,
    /// Receipts, reactions, typing and non-text media
    NoText,
    /// At or below the watermark
    Duplicate { timestamp: i64, watermark: i64 },
    /// Registry could not be read; stored but not dispatched
    RegistryUnavailable,
    /// Stored, but the chat is not registered
    Unregistered,
    /// Stored, but the chat requires a trigger the text does not carry
    TriggerMissing,
    /// Handed to the work queue
    Dispatched,
    /// The work queue refused the check
    DispatchFailed,
}

/// Why a registered chat's message is or is not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// The main chat is always dispatched
    MainChat,
    /// The chat opted out of trigger gating
    NotRequired,
    Matched,
    Missing,
}

impl TriggerDecision {
    pub fn dispatches(&self) -> bool {
        !matches!(self, TriggerDecision::Missing)
    }
}

/// Trigger rules applied to registered chats
#[derive(Debug, Clone)]
pub struct GatePolicy {
    trigger: Regex,
    main_folder: String,
}

impl GatePolicy {
    pub fn new(trigger: Regex, main_folder: impl Into<String>) -> Self {
        Self {
            trigger,
            main_folder: main_folder.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.trigger_pattern.clone(), config.main_group_folder.clone())
    }

    pub fn is_main(&self, group: &RegisteredGroup) -> bool {
        group.folder == self.main_folder
    }

    pub fn decide(&self, group: &RegisteredGroup, text: &str) -> TriggerDecision {
        if self.is_main(group) {
            TriggerDecision::MainChat
        } else if !group.requires_trigger() {
            TriggerDecision::NotRequired
        } else if self.trigger.is_match(text) {
            TriggerDecision::Matched
        } else {
            TriggerDecision::Missing
        }
    }
}
