//! Fleetwatch CLI
//!
//! Commands:
//! - `fleetwatch probe` - Probe environments once and print the results
//! - `fleetwatch monitor` - Probe on a schedule with alerting until stopped
//! - `fleetwatch channels` - Test notification and telemetry connectivity
//! - `fleetwatch alerts` - Show ongoing alerts from the saved state

pub mod output;

use crate::adapters::groundcover::GroundcoverSink;
use crate::config::{AppConfig, ConfigDir, StaticConfig, TelemetryConfig};
use crate::coordination::Monitor;
use crate::domain::{BatchSummary, ProbeTarget};
use crate::persistence::AlertStateFile;
use crate::services::batch::BatchOrchestrator;
use crate::services::probe::EnvironmentProbe;
use crate::services::telemetry::{LogSink, TelemetryDispatcher, TelemetrySink};
use crate::supervisor::alert_engine::AlertEngine;
use crate::supervisor::channels::channels_from_config;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use output::{
    alert_rows, print_items, print_success, print_warn, AlertRow, ConnectionRow, IntentRow,
    OutputMode, ResultRow,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Tenant environment monitor
#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(author, version, about = "Probe tenant environments and alert on failures")]
pub struct Cli {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, default_value = "config", env = "FLEETWATCH_CONFIG_DIR")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe environments once
    Probe {
        /// Environment URLs; defaults to `environment_urls` from config
        urls: Vec<String>,
        /// URLs to report as disabled instead of probing
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Also run the alert engine against the saved state
        #[arg(long)]
        alerts: bool,
        #[arg(long)]
        json: bool,
    },

    /// Probe on the configured interval until Ctrl+C
    Monitor,

    /// Test Slack, email and telemetry connectivity
    Channels {
        #[arg(long)]
        json: bool,
    },

    /// Show ongoing alerts
    Alerts {
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = AppConfig::load_from(&self.config_dir)?;
        if let Err(errors) = config.validate() {
            for e in &errors {
                warn!("config: {}", e);
            }
        }

        match self.command {
            Commands::Probe {
                urls,
                exclude,
                alerts,
                json,
            } => run_probe(config, urls, exclude, alerts, OutputMode::from_json_flag(json)).await,
            Commands::Monitor => run_monitor(config, self.config_dir).await,
            Commands::Channels { json } => {
                run_channels(config, OutputMode::from_json_flag(json)).await
            }
            Commands::Alerts { json } => {
                let state = AlertStateFile::new(config.state_file()).load()?;
                let rows: Vec<AlertRow> = alert_rows(&state);
                print_items(&rows, OutputMode::from_json_flag(json))
            }
        }
    }
}

/// Start the telemetry worker: Groundcover when configured, else local log only
pub fn start_telemetry(config: &TelemetryConfig) -> (TelemetryDispatcher, JoinHandle<()>) {
    let sink: Arc<dyn TelemetrySink> = match GroundcoverSink::from_config(config) {
        Some(sink) => sink as Arc<dyn TelemetrySink>,
        None => Arc::new(LogSink),
    };
    TelemetryDispatcher::spawn(sink)
}

/// Wait for queued telemetry after every dispatcher handle is gone
async fn flush_telemetry(worker: JoinHandle<()>) {
    if tokio::time::timeout(Duration::from_secs(10), worker).await.is_err() {
        warn!("telemetry flush timed out, remaining events dropped");
    }
}

async fn run_probe(
    mut config: AppConfig,
    urls: Vec<String>,
    exclude: Vec<String>,
    alerts: bool,
    mode: OutputMode,
) -> Result<()> {
    let urls = if urls.is_empty() {
        config.environment_urls.clone()
    } else {
        urls
    };
    if urls.is_empty() {
        bail!("no environment URLs given and none configured");
    }
    config.alerting.exclusions.extend(exclude);

    let (telemetry, worker) = start_telemetry(&config.telemetry);

    if alerts {
        let state_file = AlertStateFile::new(config.state_file());
        let mut monitor = Monitor::new(Arc::new(StaticConfig(config)), telemetry)
            .with_state_file(state_file)?;
        let cycle = monitor.run_cycle(Some(urls)).await?;
        drop(monitor);

        let rows: Vec<ResultRow> = cycle.results.iter().map(ResultRow::from).collect();
        print_items(&rows, mode)?;
        let intents: Vec<IntentRow> = cycle.outcome.intents.iter().map(IntentRow::from).collect();
        if mode == OutputMode::Table && intents.is_empty() {
            print_success("No alert transitions");
        } else {
            print_items(&intents, mode)?;
        }
    } else {
        let probe = EnvironmentProbe::from_config(&config, telemetry.clone())?;
        let orchestrator =
            BatchOrchestrator::new(probe, telemetry).with_concurrency(config.probe.concurrency);
        let target = ProbeTarget::new(urls).with_exclusions(config.alerting.exclusions.iter().cloned());
        let results = orchestrator.run(&target).await;
        drop(orchestrator);

        let rows: Vec<ResultRow> = results.iter().map(ResultRow::from).collect();
        print_items(&rows, mode)?;
        if mode == OutputMode::Table {
            let summary = BatchSummary::from_results(&results);
            println!(
                "{}/{} live, {} authorized, {} successful queries, {} disabled",
                summary.live,
                summary.total,
                summary.authorized,
                summary.successful_queries,
                summary.disabled
            );
        }
    }

    flush_telemetry(worker).await;
    Ok(())
}

async fn run_monitor(config: AppConfig, config_dir: PathBuf) -> Result<()> {
    let (telemetry, worker) = start_telemetry(&config.telemetry);
    let state_file = AlertStateFile::new(config.state_file());
    info!(state = %state_file.path().display(), "starting monitor");

    let handle = Monitor::new(Arc::new(ConfigDir(config_dir)), telemetry)
        .with_state_file(state_file)?
        .spawn();

    shutdown_signal().await;
    info!("Shutdown requested, finishing current cycle...");
    handle.shutdown().await;

    flush_telemetry(worker).await;
    info!("Shutdown complete");
    Ok(())
}

async fn run_channels(config: AppConfig, mode: OutputMode) -> Result<()> {
    let (telemetry, worker) = start_telemetry(&config.telemetry);
    let engine = AlertEngine::new(channels_from_config(&config.channels), telemetry);

    if engine.channels().is_empty() {
        print_warn("No notification channels enabled");
    }
    let statuses = engine.test_connections().await;
    drop(engine);

    let rows: Vec<ConnectionRow> = statuses.iter().map(ConnectionRow::from).collect();
    print_items(&rows, mode)?;

    flush_telemetry(worker).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
