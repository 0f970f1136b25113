// # allowsyncd - allowlist synchronization daemon
//
// This daemon is a THIN integration layer. All reconciliation logic lives in
// allowsync-core; this binary only:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers the adapter crates
// 4. Builds the engine for the configured role and drives it
//
// ## Commands
//
// - `allowsyncd run`   : schedule passes until SIGTERM/SIGINT (SIGHUP triggers a pass)
// - `allowsyncd once`  : run exactly one pass and exit
// - `allowsyncd plan`  : server only; print the pending changes without applying them
// - `allowsyncd rules` : server only; print the addresses ufw currently allows
//
// ## Configuration
//
// ### Role
// - `ALLOWSYNC_ROLE`: `connector` or `server` (required)
// - `ALLOWSYNC_IDENTIFIER`: name to publish under (connector)
// - `ALLOWSYNC_PORT`: port whose allow-rules are managed (server, default 22)
//
// ### Shared store
// - `ALLOWSYNC_STORE_URL`: document URL (required)
// - `ALLOWSYNC_STORE_TOKEN`: bearer token (optional)
// - `ALLOWSYNC_STORE_POINTER`: JSON pointer to the mapping (optional)
// - `ALLOWSYNC_HTTP_TIMEOUT_SECS`: per-request timeout (default 10)
//
// The document must already exist: a 404 on read is treated as the store
// being unavailable, so connectors never create it. Seed it with `{}` (or
// `{"<pointer>": {}}` when a pointer is set) before starting any role.
//
// ### Address observation (connector)
// - `ALLOWSYNC_OBSERVER_URLS`: comma-separated "what is my IP" services
//
// ### Firewall (server)
// - `ALLOWSYNC_UFW_BINARY`, `ALLOWSYNC_UFW_SUDO`, `ALLOWSYNC_UFW_COMMENT`
// - `ALLOWSYNC_CHECKPOINT_PATH`: checkpoint file, or `memory`
//
// ### Engine
// - `ALLOWSYNC_INTERVAL_SECS`: seconds between passes (default 60)
// - `ALLOWSYNC_OPERATION_DELAY_MS`: pause between firewall calls (default 500)
// - `ALLOWSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export ALLOWSYNC_ROLE=server
// export ALLOWSYNC_PORT=22
// export ALLOWSYNC_STORE_URL=https://store.example/allowlist
// export ALLOWSYNC_STORE_TOKEN=...
// export ALLOWSYNC_UFW_SUDO=true
//
// allowsyncd run
// ```

mod config;

use allowsync_core::config::{AllowsyncConfig, CheckpointConfig, RoleConfig};
use allowsync_core::model::Identifier;
use allowsync_core::traits::CheckpointStore;
use allowsync_core::{
    ComponentRegistry, ConnectorEngine, EngineEvent, FileCheckpointStore, InFlightGuard,
    MemoryCheckpointStore, Reconciler, Scheduler, SchedulerHandle, ServerEngine, TickSummary,
    run_once,
};
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use config::Config;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long an in-flight pass may take to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllowsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<AllowsyncExitCode> for ExitCode {
    fn from(code: AllowsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep a firewall allowlist in sync with a shared address document
#[derive(Debug, Parser)]
#[command(name = "allowsyncd", version, about)]
struct Cli {
    /// Log level (overrides ALLOWSYNC_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run passes on an interval until stopped (default)
    Run,
    /// Run a single pass and exit
    Once,
    /// Print the changes the next server pass would make
    Plan,
    /// Print the addresses the firewall currently allows
    Rules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return AllowsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    let log_level = match effective_level(&cli, &config) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return AllowsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    let settings = config.to_allowsync_config();
    info!(
        "Starting allowsyncd ({} role, {:?})",
        settings.role.name(),
        command
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AllowsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match execute(command, settings).await {
            Ok(()) => AllowsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// `--log-level` beats `-v`, which beats `ALLOWSYNC_LOG_LEVEL`
fn effective_level(cli: &Cli, config: &Config) -> Result<Level> {
    if let Some(level) = &cli.log_level {
        return config::parse_level(level);
    }
    match cli.verbose {
        0 => config.tracing_level(),
        1 => Ok(Level::DEBUG),
        _ => Ok(Level::TRACE),
    }
}

/// Configuration problems found while wiring components exit with 1
fn exit_code_for(error: &anyhow::Error) -> AllowsyncExitCode {
    match error.downcast_ref::<allowsync_core::Error>() {
        Some(allowsync_core::Error::Config(_) | allowsync_core::Error::InvalidInput(_)) => {
            AllowsyncExitCode::ConfigError
        }
        _ => AllowsyncExitCode::RuntimeError,
    }
}

fn registry() -> ComponentRegistry {
    let registry = ComponentRegistry::new();
    allowsync_observer_http::register(&registry);
    allowsync_store_http::register(&registry);
    allowsync_firewall_ufw::register(&registry);
    registry
}

async fn execute(command: Command, settings: AllowsyncConfig) -> Result<()> {
    let registry = registry();

    match (command, &settings.role) {
        (Command::Plan, RoleConfig::Server { .. }) => {
            let (engine, _events) = build_server(&registry, &settings).await?;
            let plan = engine.plan().await?;
            print!("{}", plan);
            Ok(())
        }
        (Command::Rules, RoleConfig::Server { .. }) => {
            let (engine, _events) = build_server(&registry, &settings).await?;
            for address in engine.active_rules().await? {
                println!("{}", address);
            }
            Ok(())
        }
        (Command::Plan | Command::Rules, RoleConfig::Connector { .. }) => Err(
            allowsync_core::Error::config(format!(
                "'{}' is only available with ALLOWSYNC_ROLE=server",
                command_name(command)
            ))
            .into(),
        ),
        (Command::Once, _) => {
            let (reconciler, events) = build_reconciler(&registry, &settings).await?;
            drop(events);
            once(reconciler.as_ref()).await
        }
        (Command::Run, _) => {
            let (reconciler, events) = build_reconciler(&registry, &settings).await?;
            run(reconciler, events, &settings).await
        }
    }
}

fn command_name(command: Command) -> &'static str {
    match command {
        Command::Run => "run",
        Command::Once => "once",
        Command::Plan => "plan",
        Command::Rules => "rules",
    }
}

async fn build_checkpoint_store(config: &CheckpointConfig) -> Result<Box<dyn CheckpointStore>> {
    match config {
        CheckpointConfig::File { path } => {
            info!("Using checkpoint file {}", path);
            Ok(Box::new(FileCheckpointStore::open(path).await?))
        }
        CheckpointConfig::Memory => {
            warn!("Using in-memory checkpoint; every restart re-applies the whole document");
            Ok(Box::new(MemoryCheckpointStore::new()))
        }
    }
}

async fn build_server(
    registry: &ComponentRegistry,
    settings: &AllowsyncConfig,
) -> Result<(ServerEngine, mpsc::Receiver<EngineEvent>)> {
    let RoleConfig::Server { port } = settings.role else {
        return Err(allowsync_core::Error::config("Not configured for the server role").into());
    };

    let store = registry.create_store(&settings.store)?;
    let controller = registry.create_controller(&settings.firewall)?;
    let checkpoints = build_checkpoint_store(&settings.checkpoint).await?;

    info!(
        "Server: managing port {} via {} from {}",
        port,
        controller.controller_name(),
        store.store_name()
    );

    Ok(ServerEngine::new(store, controller, checkpoints, port, &settings.engine).await?)
}

async fn build_reconciler(
    registry: &ComponentRegistry,
    settings: &AllowsyncConfig,
) -> Result<(Arc<dyn Reconciler>, mpsc::Receiver<EngineEvent>)> {
    match &settings.role {
        RoleConfig::Connector { identifier } => {
            let identifier = Identifier::new(identifier.clone())?;
            let observer = registry.create_observer(&settings.observer)?;
            let store = registry.create_store(&settings.store)?;

            info!(
                "Connector: publishing {} via {} to {}",
                identifier,
                observer.observer_name(),
                store.store_name()
            );

            let (engine, events) =
                ConnectorEngine::new(identifier, observer, store, &settings.engine)?;
            Ok((Arc::new(engine), events))
        }
        RoleConfig::Server { .. } => {
            let (engine, events) = build_server(registry, settings).await?;
            Ok((Arc::new(engine), events))
        }
    }
}

/// Run exactly one pass and print what it did
async fn once(reconciler: &dyn Reconciler) -> Result<()> {
    let guard = InFlightGuard::new();
    let Some(summary) = run_once(reconciler, &guard).await? else {
        anyhow::bail!("Another pass is already running");
    };

    match summary {
        TickSummary::Published(outcome) if outcome.published => {
            println!("published {}", outcome.address);
        }
        TickSummary::Published(outcome) => {
            println!("unchanged {}", outcome.address);
        }
        TickSummary::Reconciled(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Drive passes until a shutdown signal arrives
async fn run(
    reconciler: Arc<dyn Reconciler>,
    events: mpsc::Receiver<EngineEvent>,
    settings: &AllowsyncConfig,
) -> Result<()> {
    let interval = Duration::from_secs(settings.engine.interval_secs);
    let scheduler = Scheduler::new(reconciler, interval);
    let trigger = scheduler.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(log_events(events));
    let signals = tokio::spawn(forward_signals(shutdown_tx, trigger));
    let mut passes = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Daemon initialized successfully");

    tokio::select! {
        stats = &mut passes => {
            let stats = stats?;
            info!("Scheduler exited: {} pass(es)", stats.passes);
            return Ok(());
        }
        signal = signals => {
            let signal = signal??;
            info!("Received shutdown signal: {}", signal);
        }
    }

    info!("Shutting down daemon; waiting for in-flight pass");
    match tokio::time::timeout(SHUTDOWN_GRACE, passes).await {
        Ok(stats) => {
            let stats = stats?;
            info!(
                "Shutdown complete: {} pass(es), {} aborted",
                stats.passes, stats.failed_passes
            );
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_GRACE
        )),
    }
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
    }
}

/// Turn SIGTERM/SIGINT into the shutdown flag and SIGHUP into a manual pass
///
/// Returns the name of the signal that requested shutdown.
#[cfg(unix)]
async fn forward_signals(
    shutdown: watch::Sender<bool>,
    trigger: SchedulerHandle,
) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    let name = loop {
        tokio::select! {
            _ = sigterm.recv() => break "SIGTERM",
            _ = sigint.recv() => break "SIGINT",
            _ = sighup.recv() => {
                if trigger.trigger() {
                    info!("SIGHUP: pass requested");
                } else {
                    info!("SIGHUP ignored: a pass is already running or queued");
                }
            }
        }
    };

    // The scheduler may already be gone; nothing left to stop then
    let _ = shutdown.send(true);
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn forward_signals(
    shutdown: watch::Sender<bool>,
    _trigger: SchedulerHandle,
) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    let _ = shutdown.send(true);
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommand_defaults_to_run() {
        let cli = Cli::parse_from(["allowsyncd"]);
        assert_eq!(cli.command.unwrap_or(Command::Run), Command::Run);

        let cli = Cli::parse_from(["allowsyncd", "plan", "-vv"]);
        assert_eq!(cli.command, Some(Command::Plan));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn config_errors_map_to_exit_code_one() {
        let config_error: anyhow::Error = allowsync_core::Error::config("bad").into();
        assert_eq!(exit_code_for(&config_error), AllowsyncExitCode::ConfigError);

        let runtime_error: anyhow::Error =
            allowsync_core::Error::fetch(allowsync_core::Error::store_unavailable("down")).into();
        assert_eq!(
            exit_code_for(&runtime_error),
            AllowsyncExitCode::RuntimeError
        );
    }

    #[tokio::test]
    async fn connector_cannot_plan() {
        let settings = AllowsyncConfig {
            role: RoleConfig::Connector {
                identifier: "laptop".to_string(),
            },
            observer: Default::default(),
            store: allowsync_core::StoreConfig::Http {
                url: "https://store.example/allowlist".to_string(),
                token: None,
                document_pointer: None,
                timeout_secs: 10,
            },
            firewall: Default::default(),
            checkpoint: Default::default(),
            engine: Default::default(),
        };

        let err = execute(Command::Plan, settings).await.unwrap_err();
        assert_eq!(exit_code_for(&err), AllowsyncExitCode::ConfigError);
    }
}
