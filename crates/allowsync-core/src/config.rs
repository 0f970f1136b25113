//! Configuration types for allowsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main allowsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowsyncConfig {
    /// Which side of the synchronization this process plays
    pub role: RoleConfig,

    /// Address observer configuration (connector role)
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Remote document store configuration (both roles)
    pub store: StoreConfig,

    /// Firewall configuration (server role)
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Checkpoint persistence (server role)
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AllowsyncConfig {
    /// Validate the configuration
    ///
    /// Only the sections the configured role uses are checked.
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.role.validate()?;
        self.store.validate()?;
        self.engine.validate()?;

        match self.role {
            RoleConfig::Connector { .. } => self.observer.validate()?,
            RoleConfig::Server { .. } => {
                self.firewall.validate()?;
                self.checkpoint.validate()?;
            }
        }

        Ok(())
    }
}

/// Role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoleConfig {
    /// Publish this host's address under `identifier`
    Connector {
        /// Name to publish under (e.g. the host name)
        identifier: String,
    },

    /// Reconcile the local firewall against the shared document
    Server {
        /// Port whose allow-rules are managed (usually SSH)
        port: u16,
    },
}

impl RoleConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RoleConfig::Connector { identifier } => {
                if identifier.is_empty() {
                    return Err(crate::Error::config("Connector identifier cannot be empty"));
                }
                Ok(())
            }
            RoleConfig::Server { port } => {
                if *port == 0 {
                    return Err(crate::Error::config("Server port must be > 0"));
                }
                Ok(())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoleConfig::Connector { .. } => "connector",
            RoleConfig::Server { .. } => "server",
        }
    }
}

/// Address observer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverConfig {
    /// Plain-text "what is my IP" services, tried in order
    Http {
        /// Endpoints returning the caller's address as the response body
        urls: Vec<String>,
        /// Per-request timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom observer
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ObserverConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ObserverConfig::Http { urls, timeout_secs } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("HTTP observer needs at least one URL"));
                }
                for url in urls {
                    validate_http_url("HTTP observer URL", url)?;
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("HTTP observer timeout must be > 0"));
                }
                Ok(())
            }
            ObserverConfig::Custom { factory, config } => {
                validate_custom("observer", factory, config)
            }
        }
    }

    /// Get the observer type name
    pub fn type_name(&self) -> &str {
        match self {
            ObserverConfig::Http { .. } => "http",
            ObserverConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig::Http {
            urls: vec![
                "https://api.ipify.org".to_string(),
                "https://ifconfig.me/ip".to_string(),
                "https://icanhazip.com".to_string(),
            ],
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Remote document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON document behind an HTTP GET/PUT endpoint
    Http {
        /// Document URL
        url: String,
        /// Bearer token (optional)
        token: Option<String>,
        /// JSON pointer to the mapping inside a wrapper object (e.g. "/record")
        document_pointer: Option<String>,
        /// Per-request timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Http {
                url,
                token,
                document_pointer,
                timeout_secs,
            } => {
                validate_http_url("HTTP store URL", url)?;
                if token.as_ref().is_some_and(|t| t.is_empty()) {
                    return Err(crate::Error::config(
                        "HTTP store token cannot be empty when set",
                    ));
                }
                if let Some(pointer) = document_pointer {
                    if !pointer.starts_with('/') || pointer.len() < 2 {
                        return Err(crate::Error::config(format!(
                            "HTTP store document pointer must look like '/key', got '{}'",
                            pointer
                        )));
                    }
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("HTTP store timeout must be > 0"));
                }
                Ok(())
            }
            StoreConfig::Custom { factory, config } => validate_custom("store", factory, config),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Http { .. } => "http",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Firewall configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FirewallConfig {
    /// Uncomplicated Firewall
    Ufw {
        /// Path or name of the ufw binary
        #[serde(default = "default_ufw_binary")]
        binary: String,
        /// Prefix invocations with `sudo -n`
        #[serde(default)]
        use_sudo: bool,
        /// Comment attached to rules this tool creates
        #[serde(default = "default_rule_comment")]
        comment: String,
    },

    /// Custom controller
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FirewallConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FirewallConfig::Ufw { binary, .. } => {
                if binary.is_empty() {
                    return Err(crate::Error::config("ufw binary cannot be empty"));
                }
                Ok(())
            }
            FirewallConfig::Custom { factory, config } => {
                validate_custom("firewall", factory, config)
            }
        }
    }

    /// Get the controller type name
    pub fn type_name(&self) -> &str {
        match self {
            FirewallConfig::Ufw { .. } => "ufw",
            FirewallConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        FirewallConfig::Ufw {
            binary: default_ufw_binary(),
            use_sudo: false,
            comment: default_rule_comment(),
        }
    }
}

/// Checkpoint file used when none is configured
pub const DEFAULT_CHECKPOINT_PATH: &str = "/var/lib/allowsync/checkpoint.json";

/// Checkpoint persistence configuration
///
/// Defaults to a file at [`DEFAULT_CHECKPOINT_PATH`]; a server with an
/// in-memory checkpoint never removes rules for identifiers deleted while it
/// was down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointConfig {
    /// JSON file
    File {
        /// Path to the checkpoint file
        path: String,
    },

    /// In-memory (lost on restart)
    Memory,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig::File {
            path: DEFAULT_CHECKPOINT_PATH.to_string(),
        }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            CheckpointConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Checkpoint path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scheduled passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Pause between consecutive firewall invocations (in milliseconds)
    ///
    /// Rate limiting only; 0 disables it.
    #[serde(default = "default_operation_delay_ms")]
    pub operation_delay_ms: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Engine interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            operation_delay_ms: default_operation_delay_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_http_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", what)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

fn validate_custom(
    what: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} factory cannot be empty",
            what
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {} config cannot be null",
            what
        )));
    }
    Ok(())
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_ufw_binary() -> String {
    "ufw".to_string()
}

fn default_rule_comment() -> String {
    "allowsync".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_operation_delay_ms() -> u64 {
    500
}

fn default_event_channel_capacity() -> usize {
    1000
}
