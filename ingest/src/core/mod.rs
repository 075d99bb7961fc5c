//! Core ingestion logic with no I/O
//!
//! - Watermark: timestamp-based deduplication
//! - Gate: registration and trigger decisions

pub mod gate;
pub mod watermark;

pub use gate::{Disposition, GatePolicy, TriggerDecision};
pub use watermark::Watermark;
