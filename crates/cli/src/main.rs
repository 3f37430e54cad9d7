use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prism_core::{
    load_config, validate_config, RunConfig, SanitizedConfig, ShutdownHandle, Supervisor,
};

#[derive(Parser, Debug)]
#[command(
    name = "prism",
    version,
    about = "Triage provider issues with supervised fetch, test and report workers"
)]
struct Cli {
    /// Run configuration (JSON, or TOML by extension). A missing file means defaults.
    #[arg(long, env = "PRISM_CONFIG", default_value = "agent_config.json")]
    config: PathBuf,

    /// Directory holding item workspaces and reports.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Maximum number of items to process.
    #[arg(long)]
    max_items: Option<usize>,

    /// Run allow-listed commands without refusing.
    #[arg(long)]
    auto_approve: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(workdir) = &self.workdir {
            config.workspace.root = workdir.clone();
        }
        if let Some(max_items) = self.max_items {
            config.tracker.max_items = max_items;
        }
        if self.auto_approve {
            config.execution.auto_approve_commands = true;
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    info!("Loading configuration from {:?}", cli.config);
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    cli.apply(&mut config);
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Configuration loaded"
    );
    if config.execution.auto_approve_commands {
        warn!(
            allowed = ?config.execution.allowed_commands,
            "Command execution is auto-approved for this run"
        );
    }

    let supervisor = Supervisor::from_config(config).context("Failed to initialize workers")?;
    info!(run_id = %supervisor.run_id(), "Supervisor initialized");

    let shutdown = supervisor.shutdown_handle();
    let signals = tokio::spawn(forward_shutdown(shutdown));

    let result = supervisor.run().await;
    signals.abort();

    match result {
        Ok(summary) => {
            println!("{}", summary);
            Ok(0)
        }
        Err(e) => {
            error!(error = %e, "Triage run failed");
            eprintln!("Triage run failed: {}", e);
            Ok(e.exit_code())
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Trigger `shutdown` on Ctrl+C or SIGTERM.
async fn forward_shutdown(shutdown: ShutdownHandle) {
    shutdown_signal().await;
    warn!("Interrupt received, finishing current step and cleaning up");
    shutdown.trigger();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "prism",
            "--config",
            "triage.toml",
            "--workdir",
            "/tmp/runs",
            "--max-items",
            "5",
            "--auto-approve",
        ]);
        assert_eq!(cli.config, PathBuf::from("triage.toml"));

        let mut config = RunConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.workspace.root, PathBuf::from("/tmp/runs"));
        assert_eq!(config.tracker.max_items, 5);
        assert!(config.execution.auto_approve_commands);
    }

    #[test]
    fn test_cli_defaults_leave_config_alone() {
        let cli = Cli::parse_from(["prism"]);
        let mut config = RunConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.tracker.max_items, 1);
        assert!(!config.execution.auto_approve_commands);
        assert!(!cli.json_logs);
    }
}
