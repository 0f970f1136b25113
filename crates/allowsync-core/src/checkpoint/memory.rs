// # Memory Checkpoint Store
//
// In-memory implementation of CheckpointStore.
//
// All state is lost on restart, so the first pass after a restart re-adds
// every rule in the desired document. Useful for tests and for firewalls
// that are themselves reset on reboot.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::Checkpoint;
use crate::traits::CheckpointStore;

/// In-memory checkpoint store
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<RwLock<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing checkpoint
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            inner: Arc::new(RwLock::new(checkpoint)),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Checkpoint, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), Error> {
        *self.inner.write().await = checkpoint.clone();
        Ok(())
    }
}
