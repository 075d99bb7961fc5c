//! Timestamp watermark for replay protection

use shared::now_millis;

/// Timestamp (ms) of the newest accepted message
///
/// Never moves backwards. Anything at or below it has been seen already or
/// predates the process, which keeps relay redelivery and the backlog replayed
/// after a reconnect out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(i64);

impl Watermark {
    /// Watermark at process start: history from before now is not ingested
    pub fn starting_now() -> Self {
        Self(now_millis())
    }

    pub fn at(timestamp_millis: i64) -> Self {
        Self(timestamp_millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Accept `timestamp_millis` if it is newer, advancing the watermark
    pub fn admit(&mut self, timestamp_millis: i64) -> bool {
        if timestamp_millis <= self.0 {
            return false;
        }
        self.0 = timestamp_millis;
        true
    }
}
