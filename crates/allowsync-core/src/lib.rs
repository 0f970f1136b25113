// # allowsync-core
//
// Core library for keeping a firewall allowlist in sync across hosts that
// only share a remote key-value document.
//
// ## Architecture Overview
//
// - **AddressObserver**: Trait for discovering this host's public address
// - **RemoteStateStore**: Trait for the shared identifier -> address document
// - **AccessController**: Trait for adding/removing firewall allow-rules
// - **CheckpointStore**: Trait for the last fully applied document
// - **ConnectorEngine**: Publishes the observed address when it changes
// - **ServerEngine**: Diffs checkpoint vs. desired document and applies the plan
// - **Scheduler**: Drives either engine on an interval and on manual trigger
// - **ComponentRegistry**: Plugin-based registry for adapter factories
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Reconciliation logic is separate from adapters
// 2. **Forward-only checkpoint**: A completed pass always advances the baseline
// 3. **Failure isolation**: One failing rule never blocks its siblings
// 4. **Library-First**: The daemon is a thin wiring layer over this crate

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod plan;
pub mod registry;
pub mod scheduler;
pub mod traits;

// Re-export core types for convenience
pub use checkpoint::{FileCheckpointStore, MemoryCheckpointStore};
pub use config::{
    AllowsyncConfig, CheckpointConfig, EngineConfig, FirewallConfig, ObserverConfig, RoleConfig,
    StoreConfig,
};
pub use engine::{
    ConnectorEngine, EngineEvent, OperationFailure, PassOutcome, PassReport, PublishOutcome,
    Reconciler, Role, ServerEngine, TickSummary,
};
pub use error::{Error, Result};
pub use model::{Address, Checkpoint, Document, Identifier};
pub use plan::{Operation, Plan, Step};
pub use registry::ComponentRegistry;
pub use scheduler::{InFlightGuard, Scheduler, SchedulerHandle, SchedulerStats, run_once};
pub use traits::{AccessController, AddressObserver, CheckpointStore, RemoteStateStore};
