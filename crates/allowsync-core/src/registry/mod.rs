//! Plugin-based component registry
//!
//! The registry lets adapter crates register factories at startup so the
//! daemon can build components from configuration without hardcoded
//! if-else chains.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In allowsync-firewall-ufw
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_controller("ufw", Box::new(UfwFactory));
//! }
//! ```

use crate::config::{FirewallConfig, ObserverConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::traits::{AccessController, AddressObserver, RemoteStateStore};
use crate::traits::{AccessControllerFactory, AddressObserverFactory, RemoteStateStoreFactory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of adapter factories keyed by type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ComponentRegistry {
    observers: RwLock<HashMap<String, Box<dyn AddressObserverFactory>>>,
    stores: RwLock<HashMap<String, Box<dyn RemoteStateStoreFactory>>>,
    controllers: RwLock<HashMap<String, Box<dyn AccessControllerFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address observer factory
    pub fn register_observer(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AddressObserverFactory>,
    ) {
        write_map(&self.observers).insert(name.into(), factory);
    }

    /// Register a remote store factory
    pub fn register_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn RemoteStateStoreFactory>,
    ) {
        write_map(&self.stores).insert(name.into(), factory);
    }

    /// Register an access controller factory
    pub fn register_controller(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AccessControllerFactory>,
    ) {
        write_map(&self.controllers).insert(name.into(), factory);
    }

    /// Create an address observer from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn AddressObserver>)`: Created observer
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_observer(&self, config: &ObserverConfig) -> Result<Box<dyn AddressObserver>> {
        let name = config.type_name();
        let observers = read_map(&self.observers);
        let factory = observers
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown observer type: {}", name)))?;
        factory.create(config)
    }

    /// Create a remote store from configuration
    pub fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn RemoteStateStore>> {
        let name = config.type_name();
        let stores = read_map(&self.stores);
        let factory = stores
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", name)))?;
        factory.create(config)
    }

    /// Create an access controller from configuration
    pub fn create_controller(
        &self,
        config: &FirewallConfig,
    ) -> Result<Box<dyn AccessController>> {
        let name = config.type_name();
        let controllers = read_map(&self.controllers);
        let factory = controllers
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown firewall type: {}", name)))?;
        factory.create(config)
    }

    pub fn has_observer(&self, name: &str) -> bool {
        read_map(&self.observers).contains_key(name)
    }

    pub fn has_store(&self, name: &str) -> bool {
        read_map(&self.stores).contains_key(name)
    }

    pub fn has_controller(&self, name: &str) -> bool {
        read_map(&self.controllers).contains_key(name)
    }
}

// A panic while holding the lock leaves the map itself intact
fn read_map<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_map<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
