//! Core shared types and identifiers

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SharedError, SharedResult};

/// Namespace prefix separating Signal chat ids from other transports
pub const SIGNAL_PREFIX: &str = "signal:";

/// Bare recipient ids longer than this are treated as group ids at send time
pub const GROUP_ID_THRESHOLD: usize = 20;

/// Namespaced chat identifier (`signal:<group id>` or `signal:<number>`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatJid(String);

impl ChatJid {
    /// Chat id for a group conversation
    pub fn group(group_id: &str) -> Self {
        Self(format!("{SIGNAL_PREFIX}{group_id}"))
    }

    /// Chat id for a direct conversation (or a sender)
    pub fn direct(sender: &str) -> Self {
        Self(format!("{SIGNAL_PREFIX}{sender}"))
    }

    /// Accept either a namespaced or a bare recipient
    pub fn parse(recipient: &str) -> Self {
        if recipient.starts_with(SIGNAL_PREFIX) {
            Self(recipient.to_string())
        } else {
            Self::direct(recipient)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as the relay knows it, without the namespace
    pub fn bare(&self) -> &str {
        strip_namespace(&self.0)
    }

    /// Send-time heuristic: relay group ids are long base64 strings, numbers are short
    pub fn looks_like_group(&self) -> bool {
        self.bare().len() > GROUP_ID_THRESHOLD
    }
}

impl fmt::Display for ChatJid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip the `signal:` namespace if present
pub fn strip_namespace(recipient: &str) -> &str {
    recipient.strip_prefix(SIGNAL_PREFIX).unwrap_or(recipient)
}

/// Chat registered for processing, owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredGroup {
    #[serde(default)]
    pub name: String,
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_trigger: Option<bool>,
}

impl RegisteredGroup {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            folder: folder.into(),
            trigger: None,
            added_at: None,
            requires_trigger: None,
        }
    }

    pub fn with_requires_trigger(mut self, requires_trigger: bool) -> Self {
        self.requires_trigger = Some(requires_trigger);
        self
    }

    /// Unset means required
    pub fn requires_trigger(&self) -> bool {
        self.requires_trigger != Some(false)
    }
}

/// One frame of the relay's receive feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub envelope: SignalEnvelope,
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_number: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_uuid: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub data_message: Option<DataMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl SignalMessage {
    /// Parse a raw feed frame
    pub fn parse(raw: &str) -> SharedResult<Self> {
        serde_json::from_str(raw).map_err(|e| SharedError::PayloadError {
            message: e.to_string(),
        })
    }

    /// Message text, if this envelope carries any
    pub fn text(&self) -> Option<&str> {
        self.envelope
            .data_message
            .as_ref()
            .and_then(|d| d.message.as_deref())
            .filter(|text| !text.is_empty())
    }

    pub fn timestamp(&self) -> i64 {
        self.envelope.timestamp
    }

    /// Phone number when known, otherwise whatever identifier the relay gave
    pub fn sender(&self) -> Option<&str> {
        non_empty(self.envelope.source_number.as_deref()).or_else(|| non_empty(self.envelope.source.as_deref()))
    }

    pub fn group_id(&self) -> Option<&str> {
        self.envelope
            .data_message
            .as_ref()
            .and_then(|d| d.group_info.as_ref())
            .and_then(|g| non_empty(g.group_id.as_deref()))
    }

    /// Normalize into an [`IncomingMessage`]; `None` when there is no text or no sender
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let text = self.text()?;
        let sender = self.sender()?;
        let group_id = self.group_id();

        let chat_jid = match group_id {
            Some(id) => ChatJid::group(id),
            None => ChatJid::direct(sender),
        };

        Some(IncomingMessage {
            chat_jid,
            sender_jid: ChatJid::direct(sender),
            sender_name: non_empty(self.envelope.source_name.as_deref())
                .unwrap_or(sender)
                .to_string(),
            text: text.to_string(),
            timestamp_millis: self.envelope.timestamp,
            is_group: group_id.is_some(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Normalized inbound message, alive for one dispatch decision
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_jid: ChatJid,
    pub sender_jid: ChatJid,
    pub sender_name: String,
    pub text: String,
    pub timestamp_millis: i64,
    pub is_group: bool,
}

/// Group as listed by the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub pending_invites: Vec<String>,
    #[serde(default)]
    pub pending_requests: Vec<String>,
    #[serde(default)]
    pub invite_link: String,
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Current wall-clock time in milliseconds since the epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO-8601 rendering of a millisecond timestamp (`2024-01-01T00:00:00.000Z`)
pub fn millis_to_iso(timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
