//! Groundcover JSON log ingestion
//!
//! Ships telemetry events as JSON log lines to the collector endpoint.

use crate::config::TelemetryConfig;
use crate::services::telemetry::{TelemetryEvent, TelemetrySink};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SOURCE: &str = "fleetwatch";

/// Groundcover log client
#[derive(Clone)]
pub struct GroundcoverSink {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    content: &'a str,
    source: &'a str,
    string_attributes: BTreeMap<&'a str, &'a str>,
    float_attributes: &'a BTreeMap<String, f64>,
}

impl GroundcoverSink {
    /// Sink from config; `None` when telemetry is off or incomplete
    pub fn from_config(config: &TelemetryConfig) -> Option<Arc<Self>> {
        if !config.enabled || config.endpoint.is_empty() || config.api_key.is_empty() {
            return None;
        }
        match Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ) {
            Ok(sink) => {
                info!(endpoint = %config.endpoint, "Groundcover telemetry enabled");
                Some(sink)
            }
            Err(e) => {
                warn!("Groundcover HTTP client could not be built: {}", e);
                None
            }
        }
    }

    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> reqwest::Result<Arc<Self>> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Arc::new(Self {
            client,
            endpoint,
            api_key,
        }))
    }

    fn log_line<'a>(event: &'a TelemetryEvent) -> LogLine<'a> {
        let mut string_attributes: BTreeMap<&str, &str> = event
            .string_attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        string_attributes.insert("gc_source_type", "observability_report");
        if event.attr("type") == Some("check") {
            string_attributes.insert("k8s.pod.annotation.monitorLevel", "critical");
        }

        LogLine {
            timestamp: event.timestamp.to_rfc3339(),
            content: &event.content,
            source: SOURCE,
            string_attributes,
            float_attributes: &event.float_attributes,
        }
    }
}

#[async_trait]
impl TelemetrySink for GroundcoverSink {
    async fn send_event(&self, event: &TelemetryEvent) -> bool {
        match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Self::log_line(event))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                error!("Groundcover API error: {}", resp.status());
                false
            }
            Err(e) => {
                error!("Failed to send log to Groundcover: {}", e);
                false
            }
        }
    }
}
