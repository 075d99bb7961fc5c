//! Command line interface

use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

use shared::{BridgeConfig, SharedError, SharedResult};

/// Signal relay bridge: keeps the relay up and feeds its messages into the work queue
#[derive(Parser, Debug)]
#[command(name = "bridge")]
#[command(about = "Supervises the Signal relay and ingests its messages")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Relay REST base URL (overrides SIGNAL_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Data root (overrides DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Supervise the relay and run the ingestion loop until Ctrl+C (default)
    Run,

    /// Request an SMS verification code for a number
    Register {
        /// Number in international format (+15551234567)
        #[arg(long)]
        number: String,

        /// Captcha token from https://signalcaptchas.org/registration/generate.html
        #[arg(long)]
        captcha: Option<String>,
    },

    /// Complete registration with the SMS code
    Verify {
        #[arg(long)]
        number: String,

        /// Six digit code, with or without the dash (123-456)
        #[arg(long)]
        code: String,
    },

    /// Show the relay's account details for a number
    Account {
        #[arg(long)]
        number: String,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Apply command line overrides on top of the environment
    pub fn apply(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.trim_end_matches('/').to_string();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        config
    }
}

/// Numbers must be in international format
pub fn validate_number(number: &str) -> SharedResult<&str> {
    let number = number.trim();
    if number.starts_with('+') && number.len() > 1 && number[1..].chars().all(|c| c.is_ascii_digit()) {
        Ok(number)
    } else {
        Err(SharedError::invalid("number", number))
    }
}

/// Accept `123456` or `123-456` and return the digits only
pub fn normalize_code(code: &str) -> SharedResult<String> {
    let code = code.trim();
    let pattern = Regex::new(r"^\d{3}-?\d{3}$")?;
    if !pattern.is_match(code) {
        return Err(SharedError::invalid("code", code));
    }
    Ok(code.replace('-', ""))
}
