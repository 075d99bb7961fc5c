//! Ingestion-specific data types

/// Feed connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// Connection attempts, successful or not
    pub connect_attempts: u64,
    /// Frames read from the feed
    pub frames: u64,
    /// Frames rejected by the watermark
    pub duplicates: u64,
    /// Chats handed to the work queue
    pub dispatched: u64,
    /// Watermark at shutdown
    pub watermark: i64,
}
