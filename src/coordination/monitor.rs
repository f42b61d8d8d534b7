//! Monitoring loop
//!
//! A [`Monitor`] owns the alert state and runs cycles one after another:
//! reload config, probe every environment, apply the alert engine, persist
//! the new state, and send the daily report when it is due. Stopping only
//! prevents the next cycle; a cycle in flight always runs to completion.

use crate::config::{AppConfig, ConfigSource};
use crate::domain::{AlertState, ClusterMetric, ErrorDistribution, ProbeResult, ProbeTarget, ReportSnapshot};
use crate::error::Result;
use crate::persistence::AlertStateFile;
use crate::services::batch::BatchOrchestrator;
use crate::services::probe::EnvironmentProbe;
use crate::services::telemetry::TelemetryDispatcher;
use crate::supervisor::alert_engine::{AlertEngine, AlertOutcome, ConnectionStatus};
use crate::supervisor::channels::{channels_from_config, AlertChannel};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Cluster and error figures for daily reports
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn cluster_metrics(&self) -> Vec<ClusterMetric>;
    async fn error_distributions(&self) -> Vec<ErrorDistribution>;
}

/// Reports without cluster or error figures
#[derive(Debug, Default, Clone)]
pub struct NoMetrics;

#[async_trait]
impl MetricsSource for NoMetrics {
    async fn cluster_metrics(&self) -> Vec<ClusterMetric> {
        Vec::new()
    }

    async fn error_distributions(&self) -> Vec<ErrorDistribution> {
        Vec::new()
    }
}

/// What one cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub results: Vec<ProbeResult>,
    pub outcome: AlertOutcome,
    pub report: Option<Vec<ConnectionStatus>>,
}

pub struct Monitor {
    config_source: Arc<dyn ConfigSource>,
    telemetry: TelemetryDispatcher,
    channels: Option<Vec<Arc<dyn AlertChannel>>>,
    metrics: Arc<dyn MetricsSource>,
    state: AlertState,
    state_file: Option<AlertStateFile>,
    last_results: Vec<ProbeResult>,
    last_report_day: Option<NaiveDate>,
    interval: Duration,
}

impl Monitor {
    pub fn new(config_source: Arc<dyn ConfigSource>, telemetry: TelemetryDispatcher) -> Self {
        Self {
            config_source,
            telemetry,
            channels: None,
            metrics: Arc::new(NoMetrics),
            state: AlertState::new(),
            state_file: None,
            last_results: Vec::new(),
            last_report_day: None,
            interval: Duration::from_secs(5 * 60),
        }
    }

    /// Use these channels instead of building them from config each cycle
    pub fn with_channels(mut self, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Load prior state from `file` and save there after every cycle
    pub fn with_state_file(mut self, file: AlertStateFile) -> Result<Self> {
        self.state = file.load()?;
        self.state_file = Some(file);
        Ok(self)
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn last_results(&self) -> &[ProbeResult] {
        &self.last_results
    }

    fn engine(&self, config: &AppConfig) -> AlertEngine {
        let channels = match &self.channels {
            Some(channels) => channels.clone(),
            None => channels_from_config(&config.channels),
        };
        AlertEngine::new(channels, self.telemetry.clone())
    }

    /// Run one full cycle. `urls` falls back to the configured environment list.
    pub async fn run_cycle(&mut self, urls: Option<Vec<String>>) -> Result<CycleReport> {
        let config = self.config_source.load()?;
        self.interval = Duration::from_secs(config.schedule.interval_minutes.max(1) * 60);

        let urls = urls
            .filter(|urls| !urls.is_empty())
            .unwrap_or_else(|| config.environment_urls.clone());
        if urls.is_empty() {
            warn!("no environment URLs to probe");
        }
        let target =
            ProbeTarget::new(urls).with_exclusions(config.alerting.exclusions.iter().cloned());

        let probe = EnvironmentProbe::from_config(&config, self.telemetry.clone())?;
        let orchestrator = BatchOrchestrator::new(probe, self.telemetry.clone())
            .with_concurrency(config.probe.concurrency);
        let results = orchestrator.run(&target).await;

        let engine = self.engine(&config);
        let now = Utc::now();
        let outcome = engine
            .process(&config.alerting, &results, &self.state, now)
            .await;

        self.state = outcome.state.clone();
        if let Some(file) = &self.state_file {
            if let Err(e) = file.save(&self.state) {
                error!(path = %file.path().display(), error = %e, "failed to persist alert state");
            }
        }
        self.last_results = results.clone();

        info!(
            environments = results.len(),
            intents = outcome.intents.len(),
            ongoing = self.state.ongoing().count(),
            "monitoring cycle complete"
        );

        let report = self.maybe_send_daily_report(&config, &engine, now).await;

        Ok(CycleReport {
            results,
            outcome,
            report,
        })
    }

    /// Send the daily report once per UTC day, at or after the configured time.
    /// Nothing is sent while alerting is disabled.
    async fn maybe_send_daily_report(
        &mut self,
        config: &AppConfig,
        engine: &AlertEngine,
        now: DateTime<Utc>,
    ) -> Option<Vec<ConnectionStatus>> {
        let daily = &config.schedule.daily_report;
        if !daily.enabled || !config.alerting.enabled {
            return None;
        }
        let Some(at) = daily.time_of_day() else {
            warn!(time = %daily.time, "daily report time is not HH:MM, skipping");
            return None;
        };

        let today = now.date_naive();
        if now.time() < at || self.last_report_day == Some(today) {
            return None;
        }

        let snapshot = ReportSnapshot::new(self.last_results.clone(), &self.state, now).with_metrics(
            self.metrics.cluster_metrics().await,
            self.metrics.error_distributions().await,
        );
        let statuses = engine.send_report(&snapshot).await;
        self.last_report_day = Some(today);
        info!(date = %today, "daily report sent");
        Some(statuses)
    }

    /// Run cycles until stopped. Stop is checked between cycles only.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("monitoring started");
        loop {
            if *stop.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle(None).await {
                error!(error = %e, "monitoring cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("monitoring stopped");
    }

    /// Start the loop on its own task
    pub fn spawn(self) -> MonitorHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        MonitorHandle { stop: tx, task }
    }
}

/// Owner of a running monitor loop
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask the loop not to schedule another cycle
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the cycle in flight to finish
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!(error = %e, "monitor task ended abnormally");
        }
    }
}
