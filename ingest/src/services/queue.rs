//! Channel-backed work queue

use async_trait::async_trait;
use tokio::sync::mpsc;

use shared::ChatJid;

use crate::error::{IngestError, IngestResult};
use crate::traits::WorkQueue;

/// Forwards check requests to whoever holds the receiver
///
/// Unbounded so enqueueing never waits on the consumer.
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<ChatJid>,
}

impl ChannelQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatJid>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkQueue for ChannelQueue {
    async fn enqueue_check(&self, chat: &ChatJid) -> IngestResult<()> {
        self.sender.send(chat.clone()).map_err(|_| IngestError::QueueClosed {
            chat: chat.to_string(),
        })
    }
}
