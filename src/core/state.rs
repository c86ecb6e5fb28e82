use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Durable slot for the single fact the bot remembers across restarts: the
/// id of the most recently published channel message.
#[async_trait]
pub trait MessageIdStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, message_id: &str) -> Result<()>;
}

/// Stores the id as raw text in a small file, matching what the bot needs:
/// one value, overwritten on every replacement.
pub struct FileMessageIdStore {
    path: PathBuf,
}

impl FileMessageIdStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MessageIdStore for FileMessageIdStore {
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    async fn save(&self, message_id: &str) -> Result<()> {
        tokio::fs::write(&self.path, message_id)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
