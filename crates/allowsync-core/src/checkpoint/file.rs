// # File Checkpoint Store
//
// File-based implementation of CheckpointStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write temp file, fsync, rename over the target
// - Automatic backup: the previous checkpoint is kept as `.backup`
// - Corruption detection: JSON validated on load
// - Recovery: falls back to the backup if the main file is corrupted
//
// The backup is itself a previously applied checkpoint, so recovering from it
// never yields a document the server made up.
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "applied_at": "2025-01-09T12:00:00Z",
//   "document": {
//     "laptop": "203.0.113.7",
//     "office": "198.51.100.20"
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::model::{Checkpoint, Document};
use crate::traits::CheckpointStore;

/// Checkpoint file format version
const CHECKPOINT_FILE_VERSION: &str = "1";

/// File-based checkpoint store
///
/// # Example
///
/// ```rust,no_run
/// use allowsync_core::checkpoint::FileCheckpointStore;
/// use allowsync_core::traits::CheckpointStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileCheckpointStore::open("/var/lib/allowsync/checkpoint.json").await?;
///     let checkpoint = store.load().await?;
///     println!("{} identifiers applied", checkpoint.document.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    /// Serializes writers so temp/backup files are never shared
    write_lock: Mutex<()>,
}

/// Serializable checkpoint file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CheckpointFileFormat {
    version: String,
    applied_at: Option<DateTime<Utc>>,
    document: Document,
}

/// Why a checkpoint file could not be read
enum LoadFailure {
    /// File exists but does not parse
    Corrupt(String),
    /// File could not be read at all
    Io(Error),
}

impl FileCheckpointStore {
    /// Open a checkpoint store, creating parent directories if needed
    ///
    /// The file itself is not created until the first save.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create checkpoint directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load with automatic fallback to the backup file
    async fn load_with_recovery(&self) -> Result<Checkpoint, Error> {
        match Self::load_file(&self.path).await {
            Ok(Some(checkpoint)) => {
                tracing::debug!(
                    "Loaded checkpoint: {} identifiers",
                    checkpoint.document.len()
                );
                Ok(checkpoint)
            }
            Ok(None) => {
                tracing::debug!(
                    "Checkpoint file does not exist, starting empty: {}",
                    self.path.display()
                );
                Ok(Checkpoint::empty())
            }
            Err(LoadFailure::Io(e)) => Err(e),
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::warn!(
                    "Checkpoint file appears corrupted: {}. Attempting recovery from backup.",
                    reason
                );

                let backup_path = Self::backup_path(&self.path);
                match Self::load_file(&backup_path).await {
                    Ok(Some(checkpoint)) => {
                        tracing::info!(
                            "Recovered checkpoint from backup: {} identifiers",
                            checkpoint.document.len()
                        );
                        if let Err(e) = fs::copy(&backup_path, &self.path).await {
                            tracing::error!("Failed to restore checkpoint from backup: {}", e);
                        }
                        Ok(checkpoint)
                    }
                    Ok(None) => {
                        tracing::warn!("No backup file found. Starting with empty checkpoint.");
                        Ok(Checkpoint::empty())
                    }
                    Err(LoadFailure::Corrupt(backup_reason)) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty checkpoint.",
                            backup_reason
                        );
                        Ok(Checkpoint::empty())
                    }
                    Err(LoadFailure::Io(e)) => Err(e),
                }
            }
        }
    }

    /// Read one checkpoint file; `Ok(None)` when it does not exist
    async fn load_file(path: &Path) -> Result<Option<Checkpoint>, LoadFailure> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LoadFailure::Io(Error::persistence(format!(
                    "Failed to read checkpoint file {}: {}",
                    path.display(),
                    e
                ))));
            }
        };

        let file: CheckpointFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadFailure::Corrupt(format!("{}: {}", path.display(), e))
        })?;

        if file.version != CHECKPOINT_FILE_VERSION {
            tracing::warn!(
                "Checkpoint file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                CHECKPOINT_FILE_VERSION,
                file.version
            );
        }

        Ok(Some(Checkpoint {
            document: file.document,
            applied_at: file.applied_at,
        }))
    }

    /// Write the checkpoint atomically
    async fn write_file(&self, checkpoint: &Checkpoint) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let file = CheckpointFileFormat {
            version: CHECKPOINT_FILE_VERSION.to_string(),
            applied_at: checkpoint.applied_at,
            document: checkpoint.document.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::persistence(format!("Failed to serialize checkpoint: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.sync_all().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Only a readable checkpoint may replace the backup
        match Self::load_file(&self.path).await {
            Ok(Some(_)) => {
                let backup_path = Self::backup_path(&self.path);
                if let Err(e) = fs::copy(&self.path, &backup_path).await {
                    tracing::warn!("Failed to create checkpoint backup: {}", e);
                }
            }
            Ok(None) => {}
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::warn!(
                    "Keeping existing backup; current checkpoint is unreadable: {}",
                    reason
                );
            }
            Err(LoadFailure::Io(e)) => {
                tracing::warn!("Keeping existing backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Checkpoint written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint, Error> {
        self.load_with_recovery().await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), Error> {
        self.write_file(checkpoint).await
    }
}
