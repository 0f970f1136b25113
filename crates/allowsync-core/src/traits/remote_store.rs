// # Remote State Store Trait
//
// Defines the interface to the shared document every connector writes and
// every server reads.
//
// The document is always read and written whole. There is no partial update
// and no compare-and-swap: two connectors that read before either writes
// can lose one update. Callers keep the read-modify-write window short.

use async_trait::async_trait;

use crate::model::Document;

/// Trait for remote document store implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to the configured endpoint only
/// - ✅ Parse and validate the document shape
///
/// ## Forbidden Capabilities
/// - ❌ Implement retry logic or backoff (a failed pass is retried next tick)
/// - ❌ Cache the document between calls
/// - ❌ Merge documents (the engine owns read-modify-write)
///
/// ## Examples
///
/// ✅ **CORRECT**: Single-shot request, typed failure
/// ```rust,ignore
/// async fn get(&self) -> Result<Document> {
///     let response = self.client.get(&self.url).send().await
///         .map_err(|e| Error::store_unavailable(e.to_string()))?;
///     Document::from_json(response.json().await?)
/// }
/// ```
#[async_trait]
pub trait RemoteStateStore: Send + Sync {
    /// Fetch the full desired-state document
    ///
    /// # Returns
    ///
    /// - `Ok(Document)`: The current document
    /// - `Err(Error::StoreUnavailable)`: Store unreachable
    /// - `Err(Error::StoreMalformed)`: Response was not a flat string mapping
    async fn get(&self) -> Result<Document, crate::Error>;

    /// Replace the full document
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Stored
    /// - `Err(Error::StoreUnavailable)`: Store unreachable
    /// - `Err(Error::StoreRejected)`: Store refused the write (e.g. auth failure)
    async fn set(&self, document: &Document) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing stores from configuration
pub trait RemoteStateStoreFactory: Send + Sync {
    /// Create a RemoteStateStore instance from configuration
    fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn RemoteStateStore>, crate::Error>;
}
