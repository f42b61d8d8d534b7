//! Windowed batch probing
//!
//! URLs are split into consecutive windows of `concurrency`. All probes in a
//! window run at once and the next window starts only when every probe in
//! the current one has finished.

use crate::domain::{BatchSummary, ProbeResult, ProbeTarget};
use crate::services::probe::{panic_message, EnvironmentProbe};
use crate::services::telemetry::{TelemetryDispatcher, TelemetryEvent};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Runs probes for a batch of URLs in fixed-size windows
pub struct BatchOrchestrator {
    probe: Arc<EnvironmentProbe>,
    telemetry: TelemetryDispatcher,
    concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(probe: EnvironmentProbe, telemetry: TelemetryDispatcher) -> Self {
        Self {
            probe: Arc::new(probe),
            telemetry,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Window size; zero is treated as one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Probe every URL in the target. Output order matches input order and
    /// there is exactly one result per URL, including duplicates.
    pub async fn run(&self, target: &ProbeTarget) -> Vec<ProbeResult> {
        let exclusions = Arc::new(target.exclusions.clone());
        let mut results = Vec::with_capacity(target.urls.len());

        for (window, urls) in target.urls.chunks(self.concurrency).enumerate() {
            info!(window, size = urls.len(), "probing window");

            let handles: Vec<_> = urls
                .iter()
                .map(|url| {
                    let probe = Arc::clone(&self.probe);
                    let exclusions = Arc::clone(&exclusions);
                    let url = url.clone();
                    tokio::spawn(async move { probe.probe(&url, &exclusions).await })
                })
                .collect();

            for (url, joined) in urls.iter().zip(join_all(handles).await) {
                results.push(match joined {
                    Ok(result) => result,
                    Err(e) => {
                        let reason = if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        };
                        error!(url = %url, error = %reason, "probe task failed");
                        ProbeResult::failed(url, &reason, Utc::now())
                    }
                });
            }
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            total = summary.total,
            live = summary.live,
            authorized = summary.authorized,
            successful_queries = summary.successful_queries,
            disabled = summary.disabled,
            "batch complete"
        );
        self.telemetry.emit(TelemetryEvent::batch_summary(&summary));

        results
    }
}
