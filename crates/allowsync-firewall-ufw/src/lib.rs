// # ufw Access Controller
//
// This crate provides an AccessController that drives the `ufw` command-line
// tool.
//
// ## Commands
//
// - add:    `ufw allow proto tcp from <addr> to any port <port> comment <tag>`
// - remove: `ufw delete allow proto tcp from <addr> to any port <port>`
// - list:   `ufw status`, keeping `ALLOW` rows for `<port>` with a literal source
//
// With `use_sudo` every invocation is prefixed by `sudo -n`, which fails
// instead of prompting when no cached credential exists.
//
// ## Error Mapping
//
// - binary not found                              → `ToolUnavailable`
// - "need to be root" / "permission denied" / sudo password prompt → `PermissionDenied`
// - any other non-zero exit                       → `ToolRejected`
//
// Deleting a rule that does not exist counts as success; the goal state
// (no such rule) already holds.

use allowsync_core::ComponentRegistry;
use allowsync_core::config::FirewallConfig;
use allowsync_core::model::Address;
use allowsync_core::traits::{AccessController, AccessControllerFactory};
use allowsync_core::{Error, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::process::Output;
use tokio::process::Command;

/// Rules are opened for TCP only
const PROTOCOL: &str = "tcp";

/// Drives `ufw` through child processes
#[derive(Debug, Clone)]
pub struct UfwController {
    /// Path or name of the ufw binary
    binary: String,

    /// Prefix invocations with `sudo -n`
    use_sudo: bool,

    /// Comment attached to rules this controller creates
    comment: String,
}

impl UfwController {
    pub fn new(binary: impl Into<String>, use_sudo: bool, comment: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            use_sudo,
            comment: comment.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = if self.use_sudo {
            let mut sudo = Command::new("sudo");
            sudo.arg("-n").arg(&self.binary);
            sudo
        } else {
            Command::new(&self.binary)
        };
        command.args(args).kill_on_drop(true);
        command
    }

    /// Run ufw and return its stdout, mapping failures to the error taxonomy
    async fn run(&self, args: Vec<String>) -> Result<String> {
        tracing::debug!("Running {} {}", self.binary, args.join(" "));

        let output = self.command(&args).output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                let program = if self.use_sudo { "sudo" } else { self.binary.as_str() };
                Error::tool_unavailable(format!("'{}' not found", program))
            } else {
                Error::tool_unavailable(format!("failed to run '{}': {}", self.binary, e))
            }
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Err(classify_failure(&output))
    }
}

/// Refuse anything that is not a single IP literal before it reaches ufw
fn require_ip(address: &Address) -> Result<()> {
    if address.is_ip() {
        Ok(())
    } else {
        Err(Error::tool_rejected(format!(
            "'{}' is not an IP address",
            address
        )))
    }
}

fn rule_args(address: &Address, port: u16) -> Vec<String> {
    vec![
        "proto".to_string(),
        PROTOCOL.to_string(),
        "from".to_string(),
        address.to_string(),
        "to".to_string(),
        "any".to_string(),
        "port".to_string(),
        port.to_string(),
    ]
}

fn allow_args(address: &Address, port: u16, comment: &str) -> Vec<String> {
    let mut args = vec!["allow".to_string()];
    args.extend(rule_args(address, port));
    if !comment.is_empty() {
        args.push("comment".to_string());
        args.push(comment.to_string());
    }
    args
}

fn delete_args(address: &Address, port: u16) -> Vec<String> {
    let mut args = vec!["delete".to_string(), "allow".to_string()];
    args.extend(rule_args(address, port));
    args
}

fn classify_failure(output: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    let lowered = detail.to_lowercase();

    if lowered.contains("need to be root")
        || lowered.contains("permission denied")
        || lowered.contains("a password is required")
    {
        Error::permission_denied(detail)
    } else if detail.is_empty() {
        Error::tool_rejected(format!("exited with {}", output.status))
    } else {
        Error::tool_rejected(detail)
    }
}

fn is_missing_rule(message: &str) -> bool {
    message.to_lowercase().contains("non-existent rule")
}

/// Sources of `ALLOW` rows for `port` in `ufw status` output
///
/// Rows whose source is not an IP literal (e.g. `Anywhere`) are ignored.
/// Each address appears once, in first-seen order.
pub fn parse_status(output: &str, port: u16) -> Vec<Address> {
    let port = port.to_string();
    let mut addresses: Vec<Address> = Vec::new();

    for line in output.lines() {
        // Drop the trailing "# comment"
        let line = line.split('#').next().unwrap_or_default();
        let fields: Vec<&str> = line.split_whitespace().collect();

        let Some(action) = fields.iter().position(|f| *f == "ALLOW") else {
            continue;
        };
        let Some(target) = fields.first() else {
            continue;
        };
        let (target_port, proto) = match target.split_once('/') {
            Some((p, proto)) => (p, Some(proto)),
            None => (*target, None),
        };
        if target_port != port || proto.is_some_and(|p| p != PROTOCOL) {
            continue;
        }

        let source = fields[action + 1..]
            .iter()
            .find(|f| **f != "IN")
            .copied()
            .unwrap_or_default();
        if source.parse::<IpAddr>().is_err() {
            continue;
        }

        let address = Address::new(source);
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    addresses
}

#[async_trait]
impl AccessController for UfwController {
    async fn add(&self, address: &Address, port: u16) -> Result<()> {
        require_ip(address)?;
        self.run(allow_args(address, port, &self.comment)).await?;
        tracing::debug!("ufw now allows {} on port {}", address, port);
        Ok(())
    }

    async fn remove(&self, address: &Address, port: u16) -> Result<()> {
        require_ip(address)?;
        match self.run(delete_args(address, port)).await {
            Ok(stdout) => {
                if is_missing_rule(&stdout) {
                    tracing::debug!("No ufw rule for {} on port {} to delete", address, port);
                }
                Ok(())
            }
            Err(Error::ToolRejected(message)) if is_missing_rule(&message) => {
                tracing::debug!("No ufw rule for {} on port {} to delete", address, port);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self, port: u16) -> Result<Vec<Address>> {
        let stdout = self.run(vec!["status".to_string()]).await?;
        Ok(parse_status(&stdout, port))
    }

    fn controller_name(&self) -> &'static str {
        "ufw"
    }
}

/// Factory for creating ufw controllers
pub struct UfwFactory;

impl AccessControllerFactory for UfwFactory {
    fn create(&self, config: &FirewallConfig) -> Result<Box<dyn AccessController>> {
        match config {
            FirewallConfig::Ufw {
                binary,
                use_sudo,
                comment,
            } => {
                if binary.is_empty() {
                    return Err(Error::config("ufw binary cannot be empty"));
                }
                Ok(Box::new(UfwController::new(
                    binary.clone(),
                    *use_sudo,
                    comment.clone(),
                )))
            }
            _ => Err(Error::config("Invalid config for ufw controller")),
        }
    }
}

/// Register the ufw controller with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_controller("ufw", Box::new(UfwFactory));
}
