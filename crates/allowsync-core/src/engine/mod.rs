//! Reconciliation engines
//!
//! Two roles share one shared document:
//!
//! ```text
//! ┌──────────────────┐   observe    ┌──────────────────┐
//! │ AddressObserver  │─────────────▶│ ConnectorEngine  │
//! └──────────────────┘              └──────────────────┘
//!                                            │ read-modify-write
//!                                            ▼
//!                                   ┌──────────────────┐
//!                                   │ RemoteStateStore │
//!                                   └──────────────────┘
//!                                            │ get
//!                                            ▼
//! ┌──────────────────┐   load/save  ┌──────────────────┐   add/remove  ┌──────────────────┐
//! │ CheckpointStore  │◀────────────▶│  ServerEngine    │──────────────▶│ AccessController │
//! └──────────────────┘              └──────────────────┘               └──────────────────┘
//! ```
//!
//! ## Server pass
//!
//! 1. Fetch the desired document (failure aborts with nothing changed)
//! 2. Diff it against the checkpoint
//! 3. Apply every step in order, recording per-step failures
//! 4. Persist the fetched document as the new checkpoint
//!
//! Both engines implement [`Reconciler`] so the scheduler can drive either.

mod connector;
mod server;

pub use connector::{ConnectorEngine, PublishOutcome};
pub use server::{OperationFailure, PassOutcome, PassReport, ServerEngine};

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::Result;
use crate::model::{Address, Identifier};
use crate::plan::Step;

/// Which side of the synchronization an engine plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Connector,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Connector => f.write_str("connector"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Events emitted by the engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A pass began
    PassStarted { role: Role },

    /// The observed address was written to the shared document
    AddressPublished {
        identifier: Identifier,
        address: Address,
        previous: Option<Address>,
    },

    /// The observed address matched the last published one
    PublishSkipped {
        identifier: Identifier,
        address: Address,
    },

    /// A firewall step succeeded
    OperationApplied { step: Step },

    /// A firewall step failed (the pass continues)
    OperationFailed { step: Step, error: String },

    /// A pass finished and its result was recorded
    PassCompleted {
        role: Role,
        applied: usize,
        failed: usize,
    },

    /// A pass stopped early; nothing was recorded
    PassAborted { role: Role, error: String },
}

/// What one tick did
#[derive(Debug, Clone)]
pub enum TickSummary {
    Published(PublishOutcome),
    Reconciled(PassReport),
}

/// A role engine the scheduler can drive
///
/// `tick()` runs exactly one pass. Callers must not run two ticks of the
/// same engine concurrently; the scheduler's in-flight guard enforces this.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn role(&self) -> Role;

    /// Run one pass
    ///
    /// # Returns
    ///
    /// - `Ok(TickSummary)`: The pass completed (possibly with per-step failures)
    /// - `Err(Error)`: The pass aborted; engine state is unchanged
    async fn tick(&self) -> Result<TickSummary>;
}

/// Bounded, non-blocking event sender
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
