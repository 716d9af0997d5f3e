//! kubegamed, the kubegame operator.
//!
//! Watches Game and World resources and drives them to their declared
//! state:
//! - Game: a Postgres Deployment and Service, then `status.ready`
//! - World: a row in its Game's `worlds` table
//!
//! # Usage
//!
//! ```text
//! kubegamed run --config /etc/kubegame/operator.toml --namespace games
//! kubegamed crd | kubectl apply -f -
//! ```

mod driver;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kubegame_core::{Game, OperatorConfig, World};

const DEFAULT_LOG_FILTER: &str = "info,kubegamed=debug,kubegame_controller=debug";

#[derive(Parser)]
#[command(name = "kubegamed", about = "kubegame operator daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Game and World controllers until interrupted.
    Run {
        /// Operator configuration file (TOML). Environment variables override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only watch this namespace (default: all namespaces).
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Print the Game and World CustomResourceDefinitions as YAML.
    Crd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, namespace } => run(config, namespace).await,
        Command::Crd => {
            print!("{}", crd_manifests()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config_path: Option<PathBuf>, namespace: Option<String>) -> anyhow::Result<()> {
    let config = Arc::new(OperatorConfig::load(config_path.as_deref())?);
    info!(
        environment = ?config.environment,
        engine = %config.database.engine,
        database = %config.database.name,
        readiness = ?config.reconcile.readiness,
        "configuration loaded"
    );

    let client = kube::Client::try_default().await?;
    info!("connected to cluster");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    driver::run(client, config, namespace, shutdown_rx).await?;

    info!("kubegamed stopped");
    Ok(())
}

/// Both CRDs as one multi-document YAML stream.
fn crd_manifests() -> anyhow::Result<String> {
    let mut out = String::new();
    for crd in [Game::crd(), World::crd()] {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}
