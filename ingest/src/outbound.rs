//! Outbound operations through the relay
//!
//! Recipients arrive namespaced (`signal:<id>`) from the rest of the system.
//! The namespace is stripped before calling the relay, and since no group flag
//! travels with a recipient, long ids are treated as group ids.

use shared::{component_debug, component_error, component_info, ChatJid, Component};

use crate::error::IngestResult;
use crate::traits::{MessagingClient, Storage};

/// Sends, typing indicators and group metadata sync
pub struct Outbound<M, S>
where
    M: MessagingClient,
    S: Storage,
{
    client: M,
    storage: S,
}

impl<M, S> Outbound<M, S>
where
    M: MessagingClient,
    S: Storage,
{
    pub fn new(client: M, storage: S) -> Self {
        Self { client, storage }
    }

    /// Send `text` to a namespaced or bare recipient
    pub async fn send_message(&self, recipient: &str, text: &str) -> IngestResult<()> {
        let jid = ChatJid::parse(recipient);
        let is_group = jid.looks_like_group();

        match self.client.send_message(jid.bare(), text, is_group).await {
            Ok(()) => {
                component_debug!(Component::Outbound, recipient = jid.bare(), is_group, "Signal message sent");
                Ok(())
            }
            Err(e) => {
                component_error!(Component::Outbound, recipient = jid.bare(), error = %e, "Failed to send Signal message");
                Err(e)
            }
        }
    }

    /// Best effort; failures are only logged at debug level
    pub async fn set_typing(&self, recipient: &str, typing: bool) {
        let jid = ChatJid::parse(recipient);
        if let Err(e) = self.client.set_typing(jid.bare(), typing).await {
            component_debug!(Component::Outbound, recipient = jid.bare(), error = %e, "Failed to set Signal typing indicator");
        }
    }

    /// Refresh display names of every group the account is in
    ///
    /// Returns how many names were written. Safe to re-run; failures are
    /// logged and reported as zero.
    pub async fn sync_group_metadata(&self) -> usize {
        component_info!(Component::Outbound, "Syncing Signal group metadata...");

        let groups = match self.client.list_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                component_error!(Component::Outbound, error = %e, "Failed to sync Signal groups");
                return 0;
            }
        };

        let mut count = 0;
        for group in &groups {
            let jid = ChatJid::group(&group.id);
            match self.storage.update_chat_name(&jid, &group.name).await {
                Ok(()) => count += 1,
                Err(e) => {
                    component_error!(Component::Outbound, chat = %jid, error = %e, "Failed to update group name");
                }
            }
        }

        component_info!(Component::Outbound, count, "Signal group metadata synced");
        count
    }

    /// Whether the relay currently answers health checks
    pub async fn check_health(&self) -> bool {
        match self.client.health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                component_error!(Component::Outbound, error = %e, "Signal health check failed");
                false
            }
        }
    }
}
