//! Shared types for the Signal relay bridge
//!
//! Contains the types that both the relay supervisor and the ingestion
//! components agree on: chat identifiers, relay payloads, configuration,
//! errors and logging helpers.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::BridgeConfig;
pub use errors::*;
pub use logging::Component;
pub use types::*;
