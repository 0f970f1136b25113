// # Access Controller Trait
//
// Defines the interface for materializing allow-rules in the local firewall.
//
// ## Implementations
//
// - ufw: `allowsync-firewall-ufw` crate
//
// Rules are keyed by (address, port). Within one server the port is fixed,
// so the address alone identifies a rule.

use async_trait::async_trait;

use crate::model::Address;

/// Trait for firewall access controller implementations
///
/// Each call is one invocation of the external tool. Nothing here is atomic
/// with respect to other processes editing the same rule set, so `list` may
/// be stale by the time `add`/`remove` runs.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Invoke the privileged firewall tool
/// - ✅ Parse the tool's output
///
/// ## Forbidden Capabilities
/// - ❌ Retry or sleep (the engine rate-limits between operations)
/// - ❌ Decide which rules should exist (owned by `ServerEngine`)
/// - ❌ Touch the checkpoint (owned by `ServerEngine`)
#[async_trait]
pub trait AccessController: Send + Sync {
    /// Allow `address` to reach `port`
    ///
    /// # Errors
    ///
    /// - `Error::ToolUnavailable`: Tool missing
    /// - `Error::PermissionDenied`: Insufficient privilege
    /// - `Error::ToolRejected`: Tool refused the input
    async fn add(&self, address: &Address, port: u16) -> Result<(), crate::Error>;

    /// Revoke the allow-rule for `address` on `port`
    ///
    /// Removing a rule that does not exist is not an error.
    async fn remove(&self, address: &Address, port: u16) -> Result<(), crate::Error>;

    /// Addresses currently allowed on `port`
    async fn list(&self, port: u16) -> Result<Vec<Address>, crate::Error>;

    /// Get the controller name (for logging/debugging)
    fn controller_name(&self) -> &'static str;
}

/// Helper trait for constructing controllers from configuration
pub trait AccessControllerFactory: Send + Sync {
    /// Create an AccessController instance from configuration
    fn create(
        &self,
        config: &crate::config::FirewallConfig,
    ) -> Result<Box<dyn AccessController>, crate::Error>;
}
