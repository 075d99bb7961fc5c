//! File-backed message and chat storage
//!
//! Messages are appended to `messages.jsonl` (one JSON object per line).
//! Chat metadata lives in `chats.json`, a map of chat id to name and last
//! activity, rewritten as a whole under a lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use shared::{component_debug, millis_to_iso, ChatJid, Component};

use crate::error::{IngestError, IngestResult};
use crate::traits::Storage;

/// One line of `messages.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub chat_jid: ChatJid,
    pub sender: ChatJid,
    pub sender_name: String,
    pub content: String,
    pub timestamp: String,
    pub timestamp_millis: i64,
}

/// One entry of `chats.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<String>,
}

pub type ChatIndex = BTreeMap<ChatJid, ChatRecord>;

/// JSONL message log plus JSON chat index under one directory
pub struct JsonlStorage {
    dir: PathBuf,
    chats_lock: Mutex<()>,
}

impl JsonlStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            chats_lock: Mutex::new(()),
        }
    }

    /// Storage under `<data_dir>/signal`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("signal"))
    }

    pub fn messages_path(&self) -> PathBuf {
        self.dir.join("messages.jsonl")
    }

    pub fn chats_path(&self) -> PathBuf {
        self.dir.join("chats.json")
    }

    /// All stored messages in append order
    pub async fn read_messages(&self) -> IngestResult<Vec<StoredMessage>> {
        let content = match fs::read_to_string(self.messages_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            messages.push(serde_json::from_str(line)?);
        }
        Ok(messages)
    }

    /// Current chat index; missing file reads as empty
    pub async fn read_chats(&self) -> IngestResult<ChatIndex> {
        let content = match fs::read_to_string(self.chats_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ChatIndex::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(ChatIndex::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Read-modify-write of one chat record
    async fn update_chat<F>(&self, chat: &ChatJid, update: F) -> IngestResult<()>
    where
        F: FnOnce(&mut ChatRecord) + Send,
    {
        let _guard = self.chats_lock.lock().await;

        let mut chats = self.read_chats().await?;
        update(chats.entry(chat.clone()).or_default());

        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(&chats)?;

        // Write then rename so readers never see a half-written index
        let tmp = self.dir.join("chats.json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, self.chats_path()).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonlStorage {
    async fn store_message(
        &self,
        chat: &ChatJid,
        sender: &ChatJid,
        sender_name: &str,
        text: &str,
        timestamp_millis: i64,
    ) -> IngestResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let entry = StoredMessage {
            chat_jid: chat.clone(),
            sender: sender.clone(),
            sender_name: sender_name.to_string(),
            content: text.to_string(),
            timestamp: millis_to_iso(timestamp_millis),
            timestamp_millis,
        };
        let line = serde_json::to_string(&entry)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.messages_path())
            .await
            .map_err(|e| IngestError::storage(format!("{}: {e}", self.messages_path().display())))?;

        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        component_debug!(Component::Ingest, chat = %chat, "Stored Signal message");
        Ok(())
    }

    async fn store_chat_metadata(&self, chat: &ChatJid, last_activity: &str) -> IngestResult<()> {
        let last_activity = last_activity.to_string();
        self.update_chat(chat, move |record| {
            // ISO-8601 UTC strings of equal precision order lexically
            let newer = record
                .last_message_time
                .as_deref()
                .map_or(true, |current| last_activity.as_str() > current);
            if newer {
                record.last_message_time = Some(last_activity);
            }
        })
        .await
    }

    async fn update_chat_name(&self, chat: &ChatJid, name: &str) -> IngestResult<()> {
        let name = name.to_string();
        self.update_chat(chat, move |record| record.name = Some(name)).await
    }
}
