// # Checkpoint Store Trait
//
// Defines the interface for the server role's only durable state: the last
// desired-state document that was fully processed.
//
// ## Implementations
//
// - File-based: JSON with atomic replace and backup recovery
// - Memory: tests and ephemeral deployments

use async_trait::async_trait;

use crate::model::Checkpoint;

/// Trait for checkpoint persistence
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform local file I/O
/// - ✅ Keep a backup of the previous checkpoint
///
/// ## Forbidden Capabilities
/// - ❌ Write anything other than a checkpoint handed in by the engine
/// - ❌ Write partially (a save is all-or-nothing)
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last persisted checkpoint
    ///
    /// A missing checkpoint is `Ok(Checkpoint::empty())`, not an error.
    async fn load(&self) -> Result<Checkpoint, crate::Error>;

    /// Durably replace the persisted checkpoint
    ///
    /// # Errors
    ///
    /// - `Error::Persistence`: The checkpoint was not durably written; the
    ///   previously persisted checkpoint remains authoritative
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), crate::Error>;
}
