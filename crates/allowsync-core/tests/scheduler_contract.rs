//! Contract Test: Scheduling and Shutdown
//!
//! Verifies that passes never overlap and that shutdown is prompt but never
//! interrupts a pass.
//!
//! Constraints verified:
//! - The first pass runs immediately, later ones on the interval
//! - A manual trigger runs a pass when idle
//! - A trigger arriving mid-pass is dropped, not queued
//! - Shutdown stops the loop and lets an in-flight pass finish
//!
//! If this test fails, two passes can race on the firewall.

mod common;

use allowsync_core::{InFlightGuard, Reconciler, Scheduler, run_once};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const LONG: Duration = Duration::from_secs(3600);

fn scheduler(reconciler: &SlowReconciler, interval: Duration) -> Scheduler {
    let reconciler: Arc<dyn Reconciler> = Arc::new(reconciler.clone());
    Scheduler::new(reconciler, interval)
}

#[tokio::test]
async fn shutdown_stops_idle_scheduler() {
    let reconciler = SlowReconciler::new(Duration::ZERO);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler(&reconciler, LONG).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stops promptly")
        .unwrap();
    assert_eq!(stats.passes, 1, "only the immediate first pass ran");
    assert_eq!(reconciler.started(), 1);
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_scheduler() {
    let reconciler = SlowReconciler::new(Duration::ZERO);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler(&reconciler, LONG).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(shutdown_tx);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stops promptly")
        .unwrap();
}

#[tokio::test]
async fn interval_drives_repeated_passes() {
    let reconciler = SlowReconciler::new(Duration::ZERO);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler(&reconciler, Duration::from_millis(30)).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(reconciler.finished() >= 3);
}

#[tokio::test]
async fn manual_trigger_runs_a_pass() {
    let reconciler = SlowReconciler::new(Duration::ZERO);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler(&reconciler, LONG);
    let trigger = scheduler.handle();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reconciler.finished(), 1);

    assert!(trigger.trigger());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reconciler.finished(), 2);

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats.passes, 2);
}

#[tokio::test]
async fn trigger_during_pass_is_dropped() {
    let reconciler = SlowReconciler::new(Duration::from_millis(200));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler(&reconciler, LONG);
    let trigger = scheduler.handle();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(trigger.is_busy());
    assert!(!trigger.trigger(), "trigger refused while busy");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(reconciler.started(), 1, "no queued pass ran afterwards");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_pass() {
    let reconciler = SlowReconciler::new(Duration::from_millis(150));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler(&reconciler, LONG).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(reconciler.started(), 1);
    shutdown_tx.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stops after the pass")
        .unwrap();
    assert_eq!(reconciler.finished(), 1, "pass was not interrupted");
    assert_eq!(stats.passes, 1);
}

#[tokio::test]
async fn run_once_shares_the_scheduler_guard() {
    let reconciler = SlowReconciler::new(Duration::from_millis(150));
    let guard = InFlightGuard::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(
        scheduler(&reconciler, LONG)
            .with_guard(guard.clone())
            .run(shutdown_rx),
    );

    tokio::time::sleep(Duration::from_millis(30)).await;
    let skipped = run_once(&reconciler, &guard).await.unwrap();
    assert!(skipped.is_none(), "overlapping pass refused");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let ran = run_once(&reconciler, &guard).await.unwrap();
    assert!(ran.is_some());
    assert_eq!(reconciler.finished(), 2);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
