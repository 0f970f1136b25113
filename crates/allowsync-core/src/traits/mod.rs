//! Core traits for allowsync
//!
//! This module defines the abstract interfaces that all adapters must follow.
//!
//! - [`AddressObserver`]: Discover this host's public address
//! - [`RemoteStateStore`]: Read/write the shared identifier -> address document
//! - [`AccessController`]: Add, remove and list firewall allow-rules
//! - [`CheckpointStore`]: Persist the last fully applied document

pub mod access_controller;
pub mod address_observer;
pub mod checkpoint_store;
pub mod remote_store;

pub use access_controller::{AccessController, AccessControllerFactory};
pub use address_observer::{AddressObserver, AddressObserverFactory};
pub use checkpoint_store::CheckpointStore;
pub use remote_store::{RemoteStateStore, RemoteStateStoreFactory};
