//! File-backed registry of chats

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use shared::{ChatJid, RegisteredGroup};

use crate::error::IngestResult;
use crate::traits::Registry;

/// Reads `registered_groups.json` on every lookup
///
/// The file is owned by whatever registers chats; a missing file means nothing
/// is registered yet.
pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    pub const FILE_NAME: &'static str = "registered_groups.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Registry file inside the data directory
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Registry for JsonRegistry {
    async fn registered_groups(&self) -> IngestResult<HashMap<ChatJid, RegisteredGroup>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}
