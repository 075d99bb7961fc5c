//! Shared error types for the Signal relay bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Missing configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid trigger pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Relay payload error: {message}")]
    PayloadError { message: String },
}

impl SharedError {
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
