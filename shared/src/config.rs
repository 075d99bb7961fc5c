//! Bridge configuration
//!
//! Values are loaded from:
//! 1. `.env` file in the current directory or parent directories (if present)
//! 2. System environment variables
//!
//! Environment variables take precedence over .env file values. The binary
//! may override individual fields from its command line afterwards.

use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

/// Runtime configuration shared by the supervisor and the ingestion loop
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Whether the Signal integration is enabled at all
    pub enabled: bool,
    /// Account number the relay is registered with (`+15551234567`)
    pub number: Option<String>,
    /// Relay REST base URL
    pub api_url: String,
    /// Relay container name
    pub container_name: String,
    /// Relay container image
    pub image: String,
    /// Data root; the relay state lives in `<data_dir>/signal-cli`
    pub data_dir: PathBuf,
    /// Folder of the main chat, which is exempt from trigger gating
    pub main_group_folder: String,
    /// Pattern a message must match in chats that require a trigger
    pub trigger_pattern: Regex,
    /// How often group display names are refreshed from the relay
    pub group_sync_interval: Duration,
}

impl BridgeConfig {
    pub const DEFAULT_API_URL: &'static str = "http://localhost:8080";
    pub const DEFAULT_CONTAINER_NAME: &'static str = "signal-api";
    pub const DEFAULT_IMAGE: &'static str = "bbernhard/signal-cli-rest-api:latest";
    pub const DEFAULT_ASSISTANT_NAME: &'static str = "Andy";
    pub const DEFAULT_MAIN_GROUP_FOLDER: &'static str = "main";
    pub const DEFAULT_GROUP_SYNC_SECS: u64 = 24 * 60 * 60;

    /// Load from `.env` and the process environment
    pub fn from_env() -> SharedResult<Self> {
        // Silently ignored when no .env file exists
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let enabled = match get("SIGNAL_ENABLED") {
            Some(value) => parse_bool("SIGNAL_ENABLED", &value)?,
            None => false,
        };

        let trigger_pattern = match get("TRIGGER_PATTERN") {
            Some(pattern) => Regex::new(&pattern)?,
            None => trigger_for(&get("ASSISTANT_NAME").unwrap_or_else(|| Self::DEFAULT_ASSISTANT_NAME.to_string()))?,
        };

        let group_sync_secs = match get("GROUP_SYNC_INTERVAL_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| SharedError::invalid("GROUP_SYNC_INTERVAL_SECS", value))?,
            None => Self::DEFAULT_GROUP_SYNC_SECS,
        };

        Ok(Self {
            enabled,
            number: get("SIGNAL_NUMBER"),
            api_url: get("SIGNAL_API_URL")
                .unwrap_or_else(|| Self::DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            container_name: get("SIGNAL_CONTAINER_NAME").unwrap_or_else(|| Self::DEFAULT_CONTAINER_NAME.to_string()),
            image: get("SIGNAL_IMAGE").unwrap_or_else(|| Self::DEFAULT_IMAGE.to_string()),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".to_string())),
            main_group_folder: get("MAIN_GROUP_FOLDER").unwrap_or_else(|| Self::DEFAULT_MAIN_GROUP_FOLDER.to_string()),
            trigger_pattern,
            group_sync_interval: Duration::from_secs(group_sync_secs),
        })
    }

    /// Account number, required once the integration is enabled
    pub fn require_number(&self) -> SharedResult<&str> {
        self.number.as_deref().ok_or_else(|| SharedError::MissingConfig {
            field: "SIGNAL_NUMBER".to_string(),
        })
    }

    /// Host directory mounted as the relay's state directory
    pub fn relay_data_dir(&self) -> PathBuf {
        self.data_dir.join("signal-cli")
    }

    /// Websocket URL of the receive feed for `number`
    pub fn feed_url(&self, number: &str) -> String {
        let ws_base = if let Some(rest) = self.api_url.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            self.api_url.clone()
        };
        format!("{ws_base}/v1/receive/{number}")
    }

    /// Health endpoint of the relay REST API
    pub fn health_url(&self) -> String {
        format!("{}/v1/health", self.api_url)
    }
}

/// Default trigger: the assistant's name addressed at the start of the message
pub fn trigger_for(assistant_name: &str) -> SharedResult<Regex> {
    Ok(Regex::new(&format!(r"(?i)^@{}\b", regex::escape(assistant_name)))?)
}

fn parse_bool(field: &str, value: &str) -> SharedResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(SharedError::invalid(field, value)),
    }
}
