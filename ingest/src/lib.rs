//! Signal message ingestion
//!
//! Keeps a live receive feed open against the relay, deduplicates incoming
//! envelopes against a timestamp watermark, gates them by registration and
//! trigger rules and hands eligible chats to the downstream work queue. Also
//! exposes the outbound operations (send, typing, group sync) the rest of the
//! system uses to talk back through the relay.

pub mod core;
pub mod error;
pub mod ingestion;
pub mod outbound;
pub mod services;
pub mod traits;
pub mod types;

// Re-export main types
pub use crate::core::{Disposition, GatePolicy, TriggerDecision, Watermark};
pub use error::{IngestError, IngestResult};
pub use ingestion::{IngestionHandle, IngestionLoop};
pub use outbound::Outbound;
pub use traits::{FeedConnector, FeedStream, MessagingClient, Registry, Storage, WorkQueue};
pub use types::{ConnectionState, IngestionReport};
