//! Server role: converge the local firewall onto the shared document
//!
//! The checkpoint is forward-only. Once every step of a pass has been
//! attempted, the fetched document becomes the new checkpoint even if some
//! steps failed. A step that fails forever is therefore not replayed on
//! every tick; it shows up in the pass report instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use super::{EngineEvent, EventSink, Reconciler, Role, TickSummary};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{Address, Checkpoint, Document};
use crate::plan::{Plan, Step};
use crate::traits::{AccessController, CheckpointStore, RemoteStateStore};

/// A step the access controller refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub step: Step,
    pub error: String,
}

/// What happened during one server pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Plan derived from checkpoint vs. desired document
    pub plan: Plan,
    /// Steps that succeeded
    pub applied: Vec<Step>,
    /// Removals not sent because another identifier still maps to the address
    pub skipped: Vec<Step>,
    /// Steps that failed
    pub failures: Vec<OperationFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    /// No step failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`ServerEngine::reconcile`]
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// Checkpoint that was persisted at the end of the pass
    pub checkpoint: Checkpoint,
    pub report: PassReport,
}

/// Reconciles firewall allow-rules for one port against the shared document
pub struct ServerEngine {
    store: Box<dyn RemoteStateStore>,
    controller: Box<dyn AccessController>,
    checkpoints: Box<dyn CheckpointStore>,
    port: u16,
    /// Pause between consecutive controller invocations
    operation_delay: Duration,
    /// Baseline for the next pass; replaced only after a successful save
    checkpoint: Mutex<Checkpoint>,
    events: EventSink,
}

impl ServerEngine {
    /// Create a server engine, loading the persisted checkpoint
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn new(
        store: Box<dyn RemoteStateStore>,
        controller: Box<dyn AccessController>,
        checkpoints: Box<dyn CheckpointStore>,
        port: u16,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        if port == 0 {
            return Err(Error::config("Server port must be > 0"));
        }

        let checkpoint = checkpoints.load().await?;
        info!(
            "Loaded checkpoint with {} identifier(s) (applied at: {:?})",
            checkpoint.document.len(),
            checkpoint.applied_at
        );

        let (events, rx) = EventSink::channel(config.event_channel_capacity);

        let engine = Self {
            store,
            controller,
            checkpoints,
            port,
            operation_delay: Duration::from_millis(config.operation_delay_ms),
            checkpoint: Mutex::new(checkpoint),
            events,
        };

        Ok((engine, rx))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The checkpoint the next pass will diff against
    pub async fn checkpoint(&self) -> Checkpoint {
        self.checkpoint.lock().await.clone()
    }

    /// Fetch and diff without touching the firewall or the checkpoint
    pub async fn plan(&self) -> Result<Plan> {
        let desired = self.store.get().await.map_err(Error::fetch)?;
        let checkpoint = self.checkpoint.lock().await;
        Ok(Plan::diff(&checkpoint.document, &desired))
    }

    /// Addresses the firewall currently allows on the managed port
    pub async fn active_rules(&self) -> Result<Vec<Address>> {
        self.controller.list(self.port).await
    }

    /// Run one reconciliation pass against `checkpoint`
    ///
    /// On success the fetched document has been persisted and is returned as
    /// the new checkpoint. On error nothing was persisted and `checkpoint`
    /// remains authoritative.
    ///
    /// # Errors
    ///
    /// - `Error::Fetch`: The store could not be read; the firewall was not touched
    /// - `Error::Persistence`: Steps were attempted but the new checkpoint
    ///   could not be saved
    pub async fn reconcile(&self, checkpoint: &Checkpoint) -> Result<PassOutcome> {
        let started_at = Utc::now();

        let desired = self.store.get().await.map_err(Error::fetch)?;
        let plan = Plan::diff(&checkpoint.document, &desired);

        if plan.is_empty() {
            debug!("Firewall already matches {} identifier(s)", desired.len());
        } else {
            info!(
                "Applying {} operation(s) for port {} via {}",
                plan.len(),
                self.port,
                self.controller.controller_name()
            );
        }

        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();
        let mut invoked = false;

        for step in plan.steps() {
            if self.still_granted(&step, &desired) {
                debug!(
                    "Keeping rule for {}: still granted to another identifier",
                    step.address()
                );
                skipped.push(step);
                continue;
            }

            if invoked && !self.operation_delay.is_zero() {
                tokio::time::sleep(self.operation_delay).await;
            }
            invoked = true;

            match self.apply(&step).await {
                Ok(()) => {
                    info!("Applied: {}", step);
                    self.events
                        .emit(EngineEvent::OperationApplied { step: step.clone() });
                    applied.push(step);
                }
                Err(e) => {
                    warn!("Failed: {}: {}", step, e);
                    self.events.emit(EngineEvent::OperationFailed {
                        step: step.clone(),
                        error: e.to_string(),
                    });
                    failures.push(OperationFailure {
                        step,
                        error: e.to_string(),
                    });
                }
            }
        }

        let next = Checkpoint::applied(desired);
        self.checkpoints.save(&next).await.map_err(|e| match e {
            Error::Persistence(_) => e,
            other => Error::persistence(other.to_string()),
        })?;

        let report = PassReport {
            plan,
            applied,
            skipped,
            failures,
            started_at,
            finished_at: Utc::now(),
        };

        Ok(PassOutcome {
            checkpoint: next,
            report,
        })
    }

    /// A removal whose address another desired identifier still uses
    fn still_granted(&self, step: &Step, desired: &Document) -> bool {
        match step {
            Step::Remove { address, .. } => desired.identifiers_for(address).next().is_some(),
            Step::Add { .. } => false,
        }
    }

    async fn apply(&self, step: &Step) -> Result<()> {
        match step {
            Step::Add { address, .. } => self.controller.add(address, self.port).await,
            Step::Remove { address, .. } => self.controller.remove(address, self.port).await,
        }
    }
}

#[async_trait]
impl Reconciler for ServerEngine {
    fn role(&self) -> Role {
        Role::Server
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.events.emit(EngineEvent::PassStarted { role: Role::Server });

        let mut current = self.checkpoint.lock().await;
        match self.reconcile(&current).await {
            Ok(outcome) => {
                if !outcome.report.is_clean() {
                    warn!(
                        "Pass completed with {} failed step(s); checkpoint advanced anyway",
                        outcome.report.failures.len()
                    );
                }
                self.events.emit(EngineEvent::PassCompleted {
                    role: Role::Server,
                    applied: outcome.report.applied.len(),
                    failed: outcome.report.failures.len(),
                });
                *current = outcome.checkpoint;
                Ok(TickSummary::Reconciled(outcome.report))
            }
            Err(e) => {
                error!("Server pass aborted: {}", e);
                self.events.emit(EngineEvent::PassAborted {
                    role: Role::Server,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
