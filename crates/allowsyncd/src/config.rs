//! Environment configuration for allowsyncd
//!
//! Every setting comes from an `ALLOWSYNC_*` environment variable. The
//! daemon never reads a configuration file.

use allowsync_core::config::{
    AllowsyncConfig, CheckpointConfig, DEFAULT_CHECKPOINT_PATH, EngineConfig, FirewallConfig,
    ObserverConfig, RoleConfig, StoreConfig,
};
use anyhow::Result;
use std::env;
use std::str::FromStr;
use tracing::Level;

const DEFAULT_SERVER_PORT: u16 = 22;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_OPERATION_DELAY_MS: u64 = 500;

/// Checkpoint path value selecting the in-memory store
const MEMORY_CHECKPOINT: &str = "memory";

/// Application configuration
#[derive(Debug)]
pub struct Config {
    pub role: String,
    pub identifier: Option<String>,
    pub port: u16,
    pub observer_urls: Vec<String>,
    pub store_url: String,
    pub store_token: Option<String>,
    pub store_pointer: Option<String>,
    pub http_timeout_secs: u64,
    pub ufw_binary: String,
    pub ufw_sudo: bool,
    pub ufw_comment: String,
    pub checkpoint_path: String,
    pub interval_secs: u64,
    pub operation_delay_ms: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Unset and empty are the same thing
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            role: var("ALLOWSYNC_ROLE")
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "ALLOWSYNC_ROLE is required. \
                        Set it via: export ALLOWSYNC_ROLE=connector (or server)"
                    )
                })?
                .to_lowercase(),
            identifier: var("ALLOWSYNC_IDENTIFIER"),
            port: parse_or("ALLOWSYNC_PORT", var("ALLOWSYNC_PORT"), DEFAULT_SERVER_PORT)?,
            observer_urls: var("ALLOWSYNC_OBSERVER_URLS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            store_url: var("ALLOWSYNC_STORE_URL").ok_or_else(|| {
                anyhow::anyhow!(
                    "ALLOWSYNC_STORE_URL is required. \
                    Set it via: export ALLOWSYNC_STORE_URL=https://store.example/allowlist"
                )
            })?,
            store_token: var("ALLOWSYNC_STORE_TOKEN"),
            store_pointer: var("ALLOWSYNC_STORE_POINTER"),
            http_timeout_secs: parse_or(
                "ALLOWSYNC_HTTP_TIMEOUT_SECS",
                var("ALLOWSYNC_HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
            ufw_binary: var("ALLOWSYNC_UFW_BINARY").unwrap_or_else(|| "ufw".to_string()),
            ufw_sudo: parse_bool("ALLOWSYNC_UFW_SUDO", var("ALLOWSYNC_UFW_SUDO"))?,
            ufw_comment: var("ALLOWSYNC_UFW_COMMENT").unwrap_or_else(|| "allowsync".to_string()),
            checkpoint_path: var("ALLOWSYNC_CHECKPOINT_PATH")
                .unwrap_or_else(|| DEFAULT_CHECKPOINT_PATH.to_string()),
            interval_secs: parse_or(
                "ALLOWSYNC_INTERVAL_SECS",
                var("ALLOWSYNC_INTERVAL_SECS"),
                DEFAULT_INTERVAL_SECS,
            )?,
            operation_delay_ms: parse_or(
                "ALLOWSYNC_OPERATION_DELAY_MS",
                var("ALLOWSYNC_OPERATION_DELAY_MS"),
                DEFAULT_OPERATION_DELAY_MS,
            )?,
            log_level: var("ALLOWSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks the daemon-level settings here, then the assembled
    /// [`AllowsyncConfig`] for everything the core cares about.
    pub fn validate(&self) -> Result<()> {
        match self.role.as_str() {
            "connector" => {
                if self.identifier.is_none() {
                    anyhow::bail!(
                        "ALLOWSYNC_IDENTIFIER is required when ALLOWSYNC_ROLE=connector. \
                        Set it via: export ALLOWSYNC_IDENTIFIER=$(hostname)"
                    );
                }
            }
            "server" => {}
            other => anyhow::bail!(
                "ALLOWSYNC_ROLE '{}' is not supported. Supported roles: connector, server",
                other
            ),
        }

        if let Some(token) = &self.store_token {
            let lowered = token.to_lowercase();
            if lowered.contains("your_token") || lowered.contains("replace_me") {
                anyhow::bail!(
                    "ALLOWSYNC_STORE_TOKEN appears to be a placeholder. \
                    Use the actual token for your store."
                );
            }
        }

        if self.store_url.starts_with("http://") {
            eprintln!(
                "WARNING: ALLOWSYNC_STORE_URL uses HTTP (not HTTPS). \
                The allowlist and token travel in clear text."
            );
        }

        if !(5..=86_400).contains(&self.interval_secs) {
            anyhow::bail!(
                "ALLOWSYNC_INTERVAL_SECS must be between 5 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.operation_delay_ms > 60_000 {
            anyhow::bail!(
                "ALLOWSYNC_OPERATION_DELAY_MS must be at most 60000. Got: {}",
                self.operation_delay_ms
            );
        }

        self.tracing_level()?;

        self.to_allowsync_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// Parsed log level
    pub fn tracing_level(&self) -> Result<Level> {
        parse_level(&self.log_level)
    }

    /// Assemble the core configuration
    pub fn to_allowsync_config(&self) -> AllowsyncConfig {
        let role = match self.role.as_str() {
            "connector" => RoleConfig::Connector {
                identifier: self.identifier.clone().unwrap_or_default(),
            },
            _ => RoleConfig::Server { port: self.port },
        };

        let observer = if self.observer_urls.is_empty() {
            ObserverConfig::default()
        } else {
            ObserverConfig::Http {
                urls: self.observer_urls.clone(),
                timeout_secs: self.http_timeout_secs,
            }
        };

        let checkpoint = if self.checkpoint_path == MEMORY_CHECKPOINT {
            CheckpointConfig::Memory
        } else {
            CheckpointConfig::File {
                path: self.checkpoint_path.clone(),
            }
        };

        AllowsyncConfig {
            role,
            observer,
            store: StoreConfig::Http {
                url: self.store_url.clone(),
                token: self.store_token.clone(),
                document_pointer: self.store_pointer.clone(),
                timeout_secs: self.http_timeout_secs,
            },
            firewall: FirewallConfig::Ufw {
                binary: self.ufw_binary.clone(),
                use_sudo: self.ufw_sudo,
                comment: self.ufw_comment.clone(),
            },
            checkpoint,
            engine: EngineConfig {
                interval_secs: self.interval_secs,
                operation_delay_ms: self.operation_delay_ms,
                ..EngineConfig::default()
            },
        }
    }
}

/// Parse a log level name
pub fn parse_level(value: &str) -> Result<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            value
        ),
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a number. Got: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("0" | "false" | "no") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some(other) => anyhow::bail!("{} must be true or false. Got: '{}'", key, other),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const STORE: (&str, &str) = ("ALLOWSYNC_STORE_URL", "https://store.example/allowlist");

    #[test]
    fn server_defaults() {
        let config = load(&[("ALLOWSYNC_ROLE", "server"), STORE]).unwrap();
        config.validate().unwrap();

        let core = config.to_allowsync_config();
        assert_eq!(core.role, RoleConfig::Server { port: 22 });
        assert_eq!(core.engine.interval_secs, 60);
        assert_eq!(core.engine.operation_delay_ms, 500);
        assert!(matches!(
            core.checkpoint,
            CheckpointConfig::File { ref path } if path == DEFAULT_CHECKPOINT_PATH
        ));
        assert_eq!(core.firewall.type_name(), "ufw");
    }

    #[test]
    fn connector_requires_identifier() {
        let config = load(&[("ALLOWSYNC_ROLE", "connector"), STORE]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[
            ("ALLOWSYNC_ROLE", "Connector"),
            ("ALLOWSYNC_IDENTIFIER", "laptop"),
            ("ALLOWSYNC_OBSERVER_URLS", "https://a.example/ip, https://b.example/ip,"),
            STORE,
        ])
        .unwrap();
        config.validate().unwrap();

        let core = config.to_allowsync_config();
        assert_eq!(
            core.role,
            RoleConfig::Connector {
                identifier: "laptop".to_string()
            }
        );
        match core.observer {
            ObserverConfig::Http { urls, .. } => assert_eq!(urls.len(), 2),
            other => panic!("unexpected observer config: {:?}", other),
        }
    }

    #[test]
    fn missing_role_or_store_is_an_error() {
        assert!(load(&[STORE]).is_err());
        assert!(load(&[("ALLOWSYNC_ROLE", "server")]).is_err());
        assert!(load(&[("ALLOWSYNC_ROLE", "  "), STORE]).is_err());
    }

    #[test]
    fn rejects_unknown_role_and_bad_numbers() {
        let config = load(&[("ALLOWSYNC_ROLE", "relay"), STORE]).unwrap();
        assert!(config.validate().is_err());

        assert!(load(&[("ALLOWSYNC_ROLE", "server"), ("ALLOWSYNC_PORT", "ssh"), STORE]).is_err());

        let config = load(&[
            ("ALLOWSYNC_ROLE", "server"),
            ("ALLOWSYNC_INTERVAL_SECS", "1"),
            STORE,
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_port_fails_core_validation() {
        let config = load(&[("ALLOWSYNC_ROLE", "server"), ("ALLOWSYNC_PORT", "0"), STORE]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn memory_checkpoint_and_sudo() {
        let config = load(&[
            ("ALLOWSYNC_ROLE", "server"),
            ("ALLOWSYNC_CHECKPOINT_PATH", "memory"),
            ("ALLOWSYNC_UFW_SUDO", "yes"),
            STORE,
        ])
        .unwrap();

        let core = config.to_allowsync_config();
        assert!(matches!(core.checkpoint, CheckpointConfig::Memory));
        assert!(matches!(
            core.firewall,
            FirewallConfig::Ufw { use_sudo: true, .. }
        ));

        assert!(load(&[("ALLOWSYNC_ROLE", "server"), ("ALLOWSYNC_UFW_SUDO", "maybe"), STORE]).is_err());
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert!(parse_level("loud").is_err());

        let config = load(&[
            ("ALLOWSYNC_ROLE", "server"),
            ("ALLOWSYNC_LOG_LEVEL", "chatty"),
            STORE,
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }
}
