//! Ingestion trait definitions for dependency injection
//!
//! Every collaborator of the ingestion loop sits behind one of these traits so
//! the loop can be driven by fakes in tests.

use async_trait::async_trait;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use shared::{ChatJid, RegisteredGroup, SignalGroup};

use crate::error::IngestResult;

/// Live feed of raw relay frames; ends when the connection closes
pub type FeedStream = Pin<Box<dyn Stream<Item = IngestResult<String>> + Send>>;

/// REST surface of the relay used for outbound traffic
#[mockall::automock]
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Groups the account is a member of
    async fn list_groups(&self) -> IngestResult<Vec<SignalGroup>>;

    /// Send `text` to a bare recipient id (number or group id)
    async fn send_message(&self, recipient: &str, text: &str, is_group: bool) -> IngestResult<()>;

    /// Show or hide the typing indicator for a bare recipient id
    async fn set_typing(&self, recipient: &str, typing: bool) -> IngestResult<()>;

    /// Whether the relay answers its health endpoint
    async fn health(&self) -> IngestResult<bool>;
}

/// Opens the relay receive feed
#[mockall::automock]
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> IngestResult<FeedStream>;
}

/// Registered chats, owned elsewhere; re-read on every message
#[mockall::automock]
#[async_trait]
pub trait Registry: Send + Sync {
    async fn registered_groups(&self) -> IngestResult<HashMap<ChatJid, RegisteredGroup>>;
}

/// Message and chat persistence
#[mockall::automock]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist one inbound message
    async fn store_message(
        &self,
        chat: &ChatJid,
        sender: &ChatJid,
        sender_name: &str,
        text: &str,
        timestamp_millis: i64,
    ) -> IngestResult<()>;

    /// Record that `chat` saw activity at `last_activity` (ISO-8601)
    async fn store_chat_metadata(&self, chat: &ChatJid, last_activity: &str) -> IngestResult<()>;

    /// Set the display name of `chat`
    async fn update_chat_name(&self, chat: &ChatJid, name: &str) -> IngestResult<()>;
}

/// Downstream work queue; redundant checks for the same chat are safe
#[mockall::automock]
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Ask the queue to check `chat` for new messages; must not wait for the check itself
    async fn enqueue_check(&self, chat: &ChatJid) -> IngestResult<()>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn store_message(
        &self,
        chat: &ChatJid,
        sender: &ChatJid,
        sender_name: &str,
        text: &str,
        timestamp_millis: i64,
    ) -> IngestResult<()> {
        (**self)
            .store_message(chat, sender, sender_name, text, timestamp_millis)
            .await
    }

    async fn store_chat_metadata(&self, chat: &ChatJid, last_activity: &str) -> IngestResult<()> {
        (**self).store_chat_metadata(chat, last_activity).await
    }

    async fn update_chat_name(&self, chat: &ChatJid, name: &str) -> IngestResult<()> {
        (**self).update_chat_name(chat, name).await
    }
}

#[async_trait]
impl<T: MessagingClient + ?Sized> MessagingClient for Arc<T> {
    async fn list_groups(&self) -> IngestResult<Vec<SignalGroup>> {
        (**self).list_groups().await
    }

    async fn send_message(&self, recipient: &str, text: &str, is_group: bool) -> IngestResult<()> {
        (**self).send_message(recipient, text, is_group).await
    }

    async fn set_typing(&self, recipient: &str, typing: bool) -> IngestResult<()> {
        (**self).set_typing(recipient, typing).await
    }

    async fn health(&self) -> IngestResult<bool> {
        (**self).health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_trait_instantiation() {
        let _client = MockMessagingClient::new();
        let _connector = MockFeedConnector::new();
        let _registry = MockRegistry::new();
        let _storage = MockStorage::new();
        let _queue = MockWorkQueue::new();
    }

    #[tokio::test]
    async fn test_arc_storage_delegates() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_chat_name()
            .withf(|chat, name| chat.as_str() == "signal:abc" && name == "Family")
            .times(1)
            .returning(|_, _| Ok(()));

        let storage = Arc::new(storage);
        storage.update_chat_name(&ChatJid::group("abc"), "Family").await.unwrap();
    }
}
