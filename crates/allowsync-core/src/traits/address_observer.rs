// # Address Observer Trait
//
// Defines the interface for discovering the externally visible address of
// the local host.
//
// ## Implementations
//
// - HTTP echo services: `allowsync-observer-http` crate
//
// ## Usage
//
// ```rust,ignore
// use allowsync_core::AddressObserver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let observer = /* AddressObserver implementation */;
//     let address = observer.observe().await?;
//     println!("public address: {}", address);
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::Address;

/// Trait for address observer implementations
///
/// An observer is stateless: every call performs a fresh observation and
/// nothing is cached between ticks.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform network I/O to the configured echo endpoints
/// - ✅ Fail over between several endpoints within one call
///
/// ## Forbidden Capabilities
/// - ❌ Retry with sleeps or spawn polling loops (owned by `Scheduler`)
/// - ❌ Touch the remote store (owned by `ConnectorEngine`)
/// - ❌ Decide whether to publish (owned by `ConnectorEngine`)
#[async_trait]
pub trait AddressObserver: Send + Sync {
    /// Observe the current public address
    ///
    /// # Returns
    ///
    /// - `Ok(Address)`: The observed address
    /// - `Err(Error::ObserveUnavailable)`: If no endpoint produced an address
    async fn observe(&self) -> Result<Address, crate::Error>;

    /// Get the observer name (for logging/debugging)
    fn observer_name(&self) -> &'static str;
}

/// Helper trait for constructing observers from configuration
pub trait AddressObserverFactory: Send + Sync {
    /// Create an AddressObserver instance from configuration
    fn create(
        &self,
        config: &crate::config::ObserverConfig,
    ) -> Result<Box<dyn AddressObserver>, crate::Error>;
}
