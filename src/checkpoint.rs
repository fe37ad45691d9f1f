//! Persistence of the last acknowledged binlog position.
//!
//! The relay writes a checkpoint after a batch has been delivered, so a
//! restarted capture engine can resume from a position whose preceding rows
//! are known to be on the broker.
//!
//! # Example
//!
//! ```rust,no_run
//! use binlog_relay::capture::Position;
//! use binlog_relay::checkpoint::{Checkpoint, CheckpointManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("checkpoint.json");
//!
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming from {}", checkpoint.position);
//!     }
//!
//!     let checkpoint = Checkpoint::new(Position::new("mysql-bin.000003", 1024), 100);
//!     manager.save(&checkpoint).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::capture::Position;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// The last binlog position whose preceding row events were delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub position: Position,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Messages delivered since startup
    pub message_count: u64,
}

impl Checkpoint {
    pub fn new(position: Position, message_count: u64) -> Self {
        Self {
            position,
            timestamp: chrono::Utc::now(),
            message_count,
        }
    }
}

/// Reads and atomically writes a JSON checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Returns `None` when no checkpoint has been written yet.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        let content = match fs::read_to_string(&self.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint file found at {:?}", self.file_path);
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to read checkpoint file: {}", e);
                return Err(Error::Io(e));
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    "Loaded checkpoint: position={}, timestamp={}",
                    checkpoint.position, checkpoint.timestamp
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                error!("Failed to parse checkpoint file: {}", e);
                Err(Error::InvalidMessage {
                    message: format!("invalid checkpoint file {:?}: {}", self.file_path, e),
                })
            }
        }
    }

    /// Writes to a temporary sibling, syncs it, then renames it over the
    /// checkpoint file.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!("Saving checkpoint: position={}", checkpoint.position);

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!("Checkpoint saved successfully");
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.file_path).await {
            Ok(()) => {
                info!("Deleted checkpoint file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checkpoint_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(temp_dir.path().join("checkpoint.json"));

        assert!(manager.load().await.unwrap().is_none());

        let checkpoint = Checkpoint::new(Position::new("mysql-bin.000001", 4), 100);
        manager.save(&checkpoint).await.unwrap();

        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.position, Position::new("mysql-bin.000001", 4));
        assert_eq!(loaded.message_count, 100);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let manager = CheckpointManager::new(&path);
        assert!(matches!(
            manager.load().await,
            Err(Error::InvalidMessage { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(temp_dir.path().join("checkpoint.json"));

        manager.delete().await.unwrap();

        manager
            .save(&Checkpoint::new(Position::new("mysql-bin.000002", 8), 1))
            .await
            .unwrap();
        manager.delete().await.unwrap();
        assert!(manager.load().await.unwrap().is_none());
    }
}
