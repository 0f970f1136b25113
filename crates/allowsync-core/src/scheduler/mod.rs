//! Pass scheduling
//!
//! The [`Scheduler`] drives one [`Reconciler`] on a fixed interval and on
//! manual trigger. Every pass, whoever starts it, must first take the shared
//! [`InFlightGuard`]. A trigger that finds a pass in flight is dropped, not
//! queued.
//!
//! Shutdown is a `watch` flag. It is checked between passes, so a pass in
//! progress always finishes (and persists its checkpoint) before the loop
//! exits, and a flag set mid-pass is still seen afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

use crate::engine::{Reconciler, TickSummary};
use crate::error::Result;

/// Shared "a pass is running" flag
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

/// Held for the duration of a pass; releases the guard on drop
#[derive(Debug)]
pub struct InFlightToken {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a pass is already running
    pub fn try_acquire(&self) -> Option<InFlightToken> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken {
                flag: Arc::clone(&self.flag),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Run a single guarded pass
///
/// Returns `Ok(None)` when another pass holds the guard.
pub async fn run_once(
    reconciler: &dyn Reconciler,
    guard: &InFlightGuard,
) -> Result<Option<TickSummary>> {
    let Some(_token) = guard.try_acquire() else {
        warn!("A {} pass is already in flight, skipping", reconciler.role());
        return Ok(None);
    };
    reconciler.tick().await.map(Some)
}

/// Counters reported when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Passes that completed
    pub passes: usize,
    /// Passes that aborted
    pub failed_passes: usize,
    /// Triggers dropped because a pass was in flight
    pub dropped_triggers: usize,
}

/// Cloneable handle for manual triggers
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    guard: InFlightGuard,
}

impl SchedulerHandle {
    /// Ask for a pass as soon as possible
    ///
    /// Returns `false` if the trigger was dropped because a pass is running
    /// or another trigger is already pending.
    pub fn trigger(&self) -> bool {
        if self.guard.is_busy() {
            debug!("Dropping manual trigger: pass in flight");
            return false;
        }
        self.trigger_tx.try_send(()).is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }
}

/// Interval + manual-trigger driver for one reconciler
pub struct Scheduler {
    reconciler: Arc<dyn Reconciler>,
    interval: Duration,
    guard: InFlightGuard,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
}

impl Scheduler {
    pub fn new(reconciler: Arc<dyn Reconciler>, interval: Duration) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            reconciler,
            interval,
            guard: InFlightGuard::new(),
            trigger_tx,
            trigger_rx,
        }
    }

    /// Share an in-flight guard with other pass initiators
    pub fn with_guard(mut self, guard: InFlightGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            trigger_tx: self.trigger_tx.clone(),
            guard: self.guard.clone(),
        }
    }

    /// Run until the shutdown flag becomes `true` (or its sender is dropped)
    ///
    /// The first pass starts immediately. Ticks missed during a long pass are
    /// skipped rather than replayed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        let mut stats = SchedulerStats::default();

        info!(
            "Scheduler started: {} role, every {:?}",
            self.reconciler.role(),
            self.interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cause = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                    continue;
                }

                Some(_) = ticks.next() => "interval",

                Some(()) = self.trigger_rx.recv() => "manual trigger",
            };

            debug!("Starting pass ({})", cause);
            match run_once(self.reconciler.as_ref(), &self.guard).await {
                Ok(Some(summary)) => {
                    stats.passes += 1;
                    log_summary(&summary);
                }
                Ok(None) => stats.dropped_triggers += 1,
                // Already logged by the engine; retried next tick
                Err(_) => stats.failed_passes += 1,
            }

            while self.trigger_rx.try_recv().is_ok() {
                debug!("Dropping manual trigger received during pass");
                stats.dropped_triggers += 1;
            }
        }

        info!(
            "Scheduler stopped: {} pass(es), {} aborted, {} trigger(s) dropped",
            stats.passes, stats.failed_passes, stats.dropped_triggers
        );
        stats
    }
}

fn log_summary(summary: &TickSummary) {
    match summary {
        TickSummary::Published(outcome) if outcome.published => {
            info!("Published address {}", outcome.address);
        }
        TickSummary::Published(outcome) => {
            debug!("Address {} unchanged", outcome.address);
        }
        TickSummary::Reconciled(report) if report.plan.is_empty() => {
            debug!("No firewall changes needed");
        }
        TickSummary::Reconciled(report) => {
            info!(
                "Reconciled: {} applied, {} skipped, {} failed",
                report.applied.len(),
                report.skipped.len(),
                report.failures.len()
            );
        }
    }
}
