//! Ingestion services implementations

pub mod feed_connector;
pub mod queue;
pub mod registry;
pub mod signal_client;
pub mod storage;

#[cfg(test)]
pub mod tests;

pub use feed_connector::*;
pub use queue::*;
pub use registry::*;
pub use signal_client::*;
pub use storage::*;
