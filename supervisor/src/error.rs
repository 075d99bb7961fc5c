//! Supervisor-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Relay command failed: {command} ({message})")]
    CommandFailed { command: String, message: String },

    #[error("Health probe failed: {message}")]
    ProbeFailed { message: String },

    #[error("Health probe timed out after {timeout_ms}ms")]
    ProbeTimeout { timeout_ms: u64 },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
