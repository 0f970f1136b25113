//! Test doubles and common utilities for contract tests
//!
//! Every double is `Clone`; clones share their recorded state, so a test can
//! hand one clone to an engine and inspect the other.

#![allow(dead_code)]

use allowsync_core::config::EngineConfig;
use allowsync_core::engine::{Reconciler, Role, TickSummary};
use allowsync_core::error::{Error, Result};
use allowsync_core::model::{Address, Checkpoint, Document, Identifier};
use allowsync_core::traits::{AccessController, AddressObserver, CheckpointStore, RemoteStateStore};
use allowsync_core::{MemoryCheckpointStore, PublishOutcome};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

pub fn addr(s: &str) -> Address {
    Address::new(s)
}

pub fn doc(entries: &[(&str, &str)]) -> Document {
    entries.iter().map(|(i, a)| (id(i), addr(a))).collect()
}

/// Engine settings for tests: no rate-limit delay
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        interval_secs: 60,
        operation_delay_ms: 0,
        event_channel_capacity: 100,
    }
}

/// Observer returning a settable address, or failing when unset
#[derive(Clone, Default)]
pub struct MockObserver {
    address: Arc<Mutex<Option<Address>>>,
    calls: Arc<AtomicUsize>,
}

impl MockObserver {
    pub fn returning(address: &str) -> Self {
        let observer = Self::default();
        observer.set(Some(address));
        observer
    }

    pub fn set(&self, address: Option<&str>) {
        *self.address.lock().unwrap() = address.map(Address::new);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressObserver for MockObserver {
    async fn observe(&self) -> Result<Address> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.address
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::observe_unavailable("no route to echo service"))
    }

    fn observer_name(&self) -> &'static str {
        "mock"
    }
}

/// In-memory shared document with failure switches and call counters
#[derive(Clone, Default)]
pub struct MockRemoteStore {
    document: Arc<Mutex<Document>>,
    fail_get: Arc<AtomicBool>,
    fail_set: Arc<AtomicBool>,
    get_calls: Arc<AtomicUsize>,
    set_calls: Arc<AtomicUsize>,
}

impl MockRemoteStore {
    pub fn with_document(document: Document) -> Self {
        let store = Self::default();
        store.put(document);
        store
    }

    /// Replace the document as another writer would
    pub fn put(&self, document: Document) {
        *self.document.lock().unwrap() = document;
    }

    pub fn document(&self) -> Document {
        self.document.lock().unwrap().clone()
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteStateStore for MockRemoteStore {
    async fn get(&self) -> Result<Document> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("connection refused"));
        }
        Ok(self.document())
    }

    async fn set(&self, document: &Document) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(Error::store_rejected("401 Unauthorized"));
        }
        self.put(document.clone());
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "mock"
    }
}

/// A recorded controller invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(Address, u16),
    Remove(Address, u16),
}

/// Firewall double recording every call and keeping a rule set
#[derive(Clone, Default)]
pub struct MockAccessController {
    calls: Arc<Mutex<Vec<Call>>>,
    call_times: Arc<Mutex<Vec<Instant>>>,
    rules: Arc<Mutex<BTreeSet<Address>>>,
    failing_adds: Arc<Mutex<HashSet<Address>>>,
    failing_removes: Arc<Mutex<HashSet<Address>>>,
}

impl MockAccessController {
    pub fn with_rules(addresses: &[&str]) -> Self {
        let controller = Self::default();
        controller
            .rules
            .lock()
            .unwrap()
            .extend(addresses.iter().map(|a| addr(a)));
        controller
    }

    pub fn fail_add(&self, address: &str) {
        self.failing_adds.lock().unwrap().insert(addr(address));
    }

    pub fn fail_remove(&self, address: &str) {
        self.failing_removes.lock().unwrap().insert(addr(address));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Clock readings taken as each call arrived
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn rules(&self) -> Vec<Address> {
        self.rules.lock().unwrap().iter().cloned().collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        self.call_times.lock().unwrap().push(Instant::now());
    }
}

#[async_trait::async_trait]
impl AccessController for MockAccessController {
    async fn add(&self, address: &Address, port: u16) -> Result<()> {
        self.record(Call::Add(address.clone(), port));
        if self.failing_adds.lock().unwrap().contains(address) {
            return Err(Error::tool_rejected(format!("bad address '{}'", address)));
        }
        self.rules.lock().unwrap().insert(address.clone());
        Ok(())
    }

    async fn remove(&self, address: &Address, port: u16) -> Result<()> {
        self.record(Call::Remove(address.clone(), port));
        if self.failing_removes.lock().unwrap().contains(address) {
            return Err(Error::permission_denied("need to be root"));
        }
        self.rules.lock().unwrap().remove(address);
        Ok(())
    }

    async fn list(&self, _port: u16) -> Result<Vec<Address>> {
        Ok(self.rules())
    }

    fn controller_name(&self) -> &'static str {
        "mock"
    }
}

/// Memory checkpoint store whose saves can be made to fail
#[derive(Clone, Default)]
pub struct FlakyCheckpointStore {
    inner: MemoryCheckpointStore,
    fail_save: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl FlakyCheckpointStore {
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            inner: MemoryCheckpointStore::with_checkpoint(checkpoint),
            ..Self::default()
        }
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FlakyCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        self.inner.load().await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(Error::persistence("No space left on device"));
        }
        self.inner.save(checkpoint).await
    }
}

/// Reconciler that takes `duration` per pass and counts started/finished passes
#[derive(Clone)]
pub struct SlowReconciler {
    duration: Duration,
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl SlowReconciler {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Reconciler for SlowReconciler {
    fn role(&self) -> Role {
        Role::Connector
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(TickSummary::Published(PublishOutcome {
            address: addr("192.0.2.1"),
            published: false,
            previous: None,
        }))
    }
}
