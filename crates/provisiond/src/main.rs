//! provisiond: scheduled throughput autoscaling for one collection.
//!
//! # Usage
//!
//! ```text
//! provisiond run --status-port 9464
//! provisiond --dry-run once
//! provisiond simulate --partitions 4 --throughput 4000 --peak 5000
//! provisiond init acct db orders
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use provisio_autoscale::{Autoscaler, Collaborators, RunOutcome};
use provisio_core::{
    AutoscaleConfig, RawConfig, ResourceId, SignalResolution, ThroughputPolicy,
};
use provisiond::status::report_json;
use provisiond::{build_router, logging, wiring};

#[derive(Parser)]
#[command(name = "provisiond", about = "Provisio throughput autoscaler")]
struct Cli {
    /// Config file. Defaults to ./provisio.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate and log decisions without applying them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run on the configured interval and serve status.
    Run {
        /// Status server port.
        #[arg(long, default_value = "9464")]
        status_port: u16,
    },

    /// Run once and exit. The exit status reflects the run.
    Once,

    /// Run once against an in-memory collection. No network access.
    Simulate {
        #[arg(long, default_value = "1")]
        partitions: u32,

        /// Current provisioned throughput.
        #[arg(long, default_value = "1000")]
        throughput: u64,

        /// Peak sample value. Repeat for several samples.
        #[arg(long = "peak")]
        peaks: Vec<f64>,

        #[arg(long, default_value = "400")]
        min: u64,

        #[arg(long, default_value = "10000")]
        max: u64,

        #[arg(long, default_value = "100")]
        step: u64,

        #[arg(long, default_value = "independent")]
        resolution: SignalResolution,
    },

    /// Write a provisio.toml with defaults filled in.
    Init {
        account: String,
        database: String,
        collection: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.command {
        Command::Run { status_port } => {
            let autoscaler = live_autoscaler(cli.config, cli.dry_run)?;
            run_daemon(autoscaler, status_port).await
        }
        Command::Once => {
            let autoscaler = live_autoscaler(cli.config, cli.dry_run)?;
            run_single(&autoscaler).await
        }
        Command::Simulate {
            partitions,
            throughput,
            peaks,
            min,
            max,
            step,
            resolution,
        } => {
            let store = wiring::simulated_store(partitions, throughput, &peaks, chrono::Utc::now())?;
            let mut config = AutoscaleConfig::new(
                ResourceId::new("simulated", "db", "collection"),
                ThroughputPolicy::new(min, max, step)?,
            );
            config.resolution = resolution;
            let autoscaler = Autoscaler::new(config, Collaborators::single(store.clone()))
                .with_dry_run(cli.dry_run);
            run_single(&autoscaler).await?;
            info!(throughput = store.throughput(), "simulated collection after run");
            Ok(())
        }
        Command::Init {
            account,
            database,
            collection,
            force,
        } => {
            let path = cli.config.unwrap_or_else(|| PathBuf::from(wiring::DEFAULT_CONFIG));
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let content = RawConfig::scaffold(&account, &database, &collection).to_toml_string()?;
            std::fs::write(&path, content)?;
            info!(path = %path.display(), "config written; set authKey and applicationPwd in the environment");
            Ok(())
        }
    }
}

fn live_autoscaler(config_path: Option<PathBuf>, dry_run: bool) -> anyhow::Result<Autoscaler> {
    let raw = wiring::load_config(config_path.as_deref(), |k| std::env::var(k).ok())?;
    let config = raw.resolve()?;
    info!(
        resource = %config.resource,
        min = config.policy.min,
        max = config.policy.max,
        step = config.policy.step,
        resolution = ?config.resolution,
        "config resolved"
    );
    let collaborators = wiring::azure_collaborators(&raw, &config)?;
    Ok(Autoscaler::new(config, collaborators).with_dry_run(dry_run))
}

async fn run_single(autoscaler: &Autoscaler) -> anyhow::Result<()> {
    match autoscaler.run_once().await? {
        RunOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            Ok(())
        }
        RunOutcome::Skipped => bail!("run skipped"),
    }
}

async fn run_daemon(autoscaler: Autoscaler, status_port: u16) -> anyhow::Result<()> {
    info!("provisio daemon starting");
    let autoscaler = Arc::new(autoscaler);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Scheduler loop ─────────────────────────────────────────

    let loop_handle = {
        let autoscaler = autoscaler.clone();
        tokio::spawn(async move {
            autoscaler.run(shutdown_rx).await;
        })
    };

    // ── Status server ──────────────────────────────────────────

    let router = build_router(autoscaler);
    let addr = SocketAddr::from(([0, 0, 0, 0], status_port));
    info!(%addr, "status server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    wiring::join_scheduler(loop_handle).await?;
    info!("provisio daemon stopped");
    Ok(())
}
