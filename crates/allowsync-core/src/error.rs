//! Error types for allowsync
//!
//! Adapter errors describe what an external collaborator reported. Stage
//! errors (`Observe`, `Fetch`, `StoreWrite`, `Persistence`) wrap an adapter
//! error with the point in a pass where it aborted the pass.

use thiserror::Error;

/// Result type alias for allowsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for allowsync
#[derive(Error, Debug)]
pub enum Error {
    /// The public address could not be determined
    #[error("Address observation unavailable: {0}")]
    ObserveUnavailable(String),

    /// The remote document store could not be reached
    #[error("Remote store unavailable: {0}")]
    StoreUnavailable(String),

    /// The remote document was not a flat identifier -> address mapping
    #[error("Remote store returned a malformed document: {0}")]
    StoreMalformed(String),

    /// The remote store refused the request (e.g. authentication)
    #[error("Remote store rejected the request: {0}")]
    StoreRejected(String),

    /// The firewall tool is missing
    #[error("Firewall tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The firewall tool needs more privilege than the process has
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The firewall tool refused the input (e.g. invalid address)
    #[error("Firewall tool rejected the operation: {0}")]
    ToolRejected(String),

    /// Observing the address aborted a connector pass
    #[error("Observe failed: {0}")]
    Observe(#[source] Box<Error>),

    /// Fetching the desired document aborted a server pass
    #[error("Fetch failed: {0}")]
    Fetch(#[source] Box<Error>),

    /// Writing the document back aborted a connector pass
    #[error("Store write failed: {0}")]
    StoreWrite(#[source] Box<Error>),

    /// Reading or writing the local checkpoint failed
    #[error("Checkpoint persistence failed: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an observation error
    pub fn observe_unavailable(msg: impl Into<String>) -> Self {
        Self::ObserveUnavailable(msg.into())
    }

    /// Create a store-unreachable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a malformed-document error
    pub fn store_malformed(msg: impl Into<String>) -> Self {
        Self::StoreMalformed(msg.into())
    }

    /// Create a store-rejected error
    pub fn store_rejected(msg: impl Into<String>) -> Self {
        Self::StoreRejected(msg.into())
    }

    /// Create a missing-tool error
    pub fn tool_unavailable(msg: impl Into<String>) -> Self {
        Self::ToolUnavailable(msg.into())
    }

    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a tool-rejected error
    pub fn tool_rejected(msg: impl Into<String>) -> Self {
        Self::ToolRejected(msg.into())
    }

    /// Wrap an error as an aborted observation
    pub fn observe(err: Error) -> Self {
        Self::Observe(Box::new(err))
    }

    /// Wrap an error as an aborted fetch
    pub fn fetch(err: Error) -> Self {
        Self::Fetch(Box::new(err))
    }

    /// Wrap an error as an aborted store write
    pub fn store_write(err: Error) -> Self {
        Self::StoreWrite(Box::new(err))
    }

    /// Create a checkpoint persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error aborts a whole pass rather than a single operation
    pub fn aborts_pass(&self) -> bool {
        matches!(
            self,
            Self::Observe(_) | Self::Fetch(_) | Self::StoreWrite(_) | Self::Persistence(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
