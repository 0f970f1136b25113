//! Connector role: publish this host's address when it changes

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};

use super::{EngineEvent, EventSink, Reconciler, Role, TickSummary};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{Address, Identifier};
use crate::traits::{AddressObserver, RemoteStateStore};

/// Result of one publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The freshly observed address
    pub address: Address,
    /// Whether the shared document was written
    pub published: bool,
    /// Address the document held for this identifier before the write
    pub previous: Option<Address>,
}

/// Publishes the observed address under a fixed identifier
///
/// The last published address is owned by this engine and starts out
/// unknown, so the first tick after a restart always writes.
pub struct ConnectorEngine {
    identifier: Identifier,
    observer: Box<dyn AddressObserver>,
    store: Box<dyn RemoteStateStore>,
    last_published: Mutex<Option<Address>>,
    events: EventSink,
}

impl ConnectorEngine {
    /// Create a connector engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        identifier: Identifier,
        observer: Box<dyn AddressObserver>,
        store: Box<dyn RemoteStateStore>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let (events, rx) = EventSink::channel(config.event_channel_capacity);

        let engine = Self {
            identifier,
            observer,
            store,
            last_published: Mutex::new(None),
            events,
        };

        Ok((engine, rx))
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Address written by the most recent successful publish
    pub async fn last_published(&self) -> Option<Address> {
        self.last_published.lock().await.clone()
    }

    /// Observe the address and publish it if it differs from `last_published`
    ///
    /// The store is only touched when the address changed. Publishing reads
    /// the whole document, sets this identifier, and writes the whole
    /// document back; entries of other identifiers present at read time are
    /// carried over unchanged.
    ///
    /// # Errors
    ///
    /// - `Error::Observe`: No address could be observed; nothing was written
    /// - `Error::Fetch`: The document could not be read; nothing was written
    /// - `Error::StoreWrite`: The document could not be written
    pub async fn publish_if_changed(
        &self,
        last_published: Option<&Address>,
    ) -> Result<PublishOutcome> {
        let address = self.observer.observe().await.map_err(Error::observe)?;

        if last_published == Some(&address) {
            debug!(
                "Address for {} unchanged ({}), skipping publish",
                self.identifier, address
            );
            self.events.emit(EngineEvent::PublishSkipped {
                identifier: self.identifier.clone(),
                address: address.clone(),
            });
            return Ok(PublishOutcome {
                address,
                published: false,
                previous: last_published.cloned(),
            });
        }

        let mut document = self.store.get().await.map_err(Error::fetch)?;
        let previous = document.insert(self.identifier.clone(), address.clone());
        self.store
            .set(&document)
            .await
            .map_err(Error::store_write)?;

        info!(
            "Published {} -> {} via {} (previous: {:?})",
            self.identifier,
            address,
            self.store.store_name(),
            previous.as_ref().map(Address::as_str)
        );
        self.events.emit(EngineEvent::AddressPublished {
            identifier: self.identifier.clone(),
            address: address.clone(),
            previous: previous.clone(),
        });

        Ok(PublishOutcome {
            address,
            published: true,
            previous,
        })
    }
}

#[async_trait]
impl Reconciler for ConnectorEngine {
    fn role(&self) -> Role {
        Role::Connector
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.events.emit(EngineEvent::PassStarted {
            role: Role::Connector,
        });

        let mut last = self.last_published.lock().await;
        match self.publish_if_changed(last.as_ref()).await {
            Ok(outcome) => {
                if outcome.published {
                    *last = Some(outcome.address.clone());
                }
                self.events.emit(EngineEvent::PassCompleted {
                    role: Role::Connector,
                    applied: usize::from(outcome.published),
                    failed: 0,
                });
                Ok(TickSummary::Published(outcome))
            }
            Err(e) => {
                error!("Connector pass aborted: {}", e);
                self.events.emit(EngineEvent::PassAborted {
                    role: Role::Connector,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
