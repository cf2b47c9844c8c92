//! Legal hold export service
//!
//! Periodically exports the channel activity of every legal hold into an
//! integrity-protected bundle in object storage.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use common::registry::{HoldRegistry, SqlHoldRegistry};
use common::storage::create_object_store;
use exporter::{
    BundleStore, JobSettings, LegalHoldJob, RunOutcome, SqlRecordStore, verify_bundle,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the export job on its schedule until SIGINT or SIGTERM
    Run,
    /// Process every hold once and exit
    RunOnce,
    /// Export one hold now, even if its next slice is not yet due
    RunHold {
        /// Hold ID
        id: String,
    },
    /// Check a hold bundle against its hash manifest
    Verify {
        /// Hold ID
        id: String,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}

async fn open_registry(config: &Configuration) -> Result<Arc<SqlHoldRegistry>> {
    let registry = SqlHoldRegistry::new(&config.registry.dsn)
        .await
        .context("Failed to open hold registry")?;
    Ok(Arc::new(registry))
}

fn open_bundles(config: &Configuration) -> Result<BundleStore> {
    let store = create_object_store(&config.storage).context("Failed to open bundle storage")?;
    Ok(BundleStore::new(store))
}

async fn build_job(config: &Configuration) -> Result<Arc<LegalHoldJob>> {
    let settings = JobSettings::from_config(config).context("Invalid job settings")?;
    let registry = open_registry(config).await?;
    let records = SqlRecordStore::new(&config.database.dsn)
        .await
        .context("Failed to connect to record store")?;
    let bundles = open_bundles(config)?;

    Ok(Arc::new(LegalHoldJob::new(
        registry,
        Arc::new(records),
        bundles,
        settings,
    )))
}

fn report(outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed(summary) => {
            tracing::info!(
                holds_processed = summary.holds_processed,
                slices_executed = summary.slices_executed,
                slices_failed = summary.slices_failed,
                conflicts = summary.conflicts,
                "Legal hold run finished"
            );
            if summary.slices_failed > 0 {
                bail!("{} slice(s) failed", summary.slices_failed);
            }
            Ok(())
        }
        RunOutcome::Skipped => bail!("Another legal hold run is active"),
    }
}

async fn run_service(config: &Configuration) -> Result<()> {
    let job = build_job(config).await?;
    let settings = job.settings().await;

    job.on_configuration_change(settings.clone()).await;
    tracing::info!(
        version = %utils::version_info(),
        "Legal hold service running, waiting for shutdown signal"
    );

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal, stopping legal hold service");

    job.stop(settings.stop_timeout)
        .await
        .context("Failed to stop legal hold job")?;
    job.metrics().log_summary();
    Ok(())
}

async fn verify(config: &Configuration, id: &str) -> Result<()> {
    let registry = open_registry(config).await?;
    let hold = registry
        .get_hold(id)
        .await
        .context("Failed to read hold")?
        .with_context(|| format!("Hold {id} not found"))?;
    let bundles = open_bundles(config)?;

    let report = verify_bundle(&bundles, &hold)
        .await
        .context("Failed to verify bundle")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "hold_id": hold.id,
            "verified": report.verified.len(),
            "mismatched": report.mismatched,
            "missing": report.missing,
        }))?
    );

    if !report.is_intact() {
        bail!("Bundle of hold {id} failed verification");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Command::Run => run_service(&config).await,
        Command::RunOnce => {
            let job = build_job(&config).await?;
            report(job.run().await.context("Legal hold run failed")?)
        }
        Command::RunHold { id } => {
            let job = build_job(&config).await?;
            report(
                job.run_single_hold(&id)
                    .await
                    .with_context(|| format!("Failed to run hold {id}"))?,
            )
        }
        Command::Verify { id } => verify(&config, &id).await,
        Command::Config { json } => utils::display_config(&config, json),
    }
}
