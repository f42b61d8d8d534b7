//! Fire-and-forget telemetry
//!
//! Probes and the alert engine hand events to a [`TelemetryDispatcher`],
//! which queues them for a background task that talks to the sink. Emitting
//! never waits on the network, so a slow or dead collector cannot change
//! probe timing or outcomes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{AlertIntent, BatchSummary, ProbeResult};

/// One structured event for the telemetry collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub string_attributes: BTreeMap<String, String>,
    pub float_attributes: BTreeMap<String, f64>,
}

impl TelemetryEvent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            content: content.into(),
            string_attributes: BTreeMap::new(),
            float_attributes: BTreeMap::new(),
        }
    }

    pub fn with_str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.string_attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_f64(mut self, key: &str, value: f64) -> Self {
        self.float_attributes.insert(key.to_string(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.string_attributes.get(key).map(String::as_str)
    }

    /// Emitted after each probe step
    pub fn check(
        step: &str,
        url: &str,
        status: &str,
        namespace: &str,
        cluster: &str,
        duration: Duration,
        error: Option<&str>,
    ) -> Self {
        let content = match error {
            Some(error) => format!("{step} test for {url}: {status} - {error}"),
            None => format!("{step} test for {url}: {status}"),
        };
        Self::new(content)
            .with_str("type", "check")
            .with_str("test_type", step)
            .with_str("url", url)
            .with_str("status", status)
            .with_str("namespace", namespace)
            .with_str("cluster", cluster)
            .with_f64("duration_ms", duration.as_secs_f64() * 1000.0)
    }

    /// Emitted once per batch
    pub fn batch_summary(summary: &BatchSummary) -> Self {
        Self::new("System event: environment_test_summary")
            .with_str("type", "system_event")
            .with_str("event", "environment_test_summary")
            .with_f64("total", summary.total as f64)
            .with_f64("live", summary.live as f64)
            .with_f64("authorized", summary.authorized as f64)
            .with_f64("successful_queries", summary.successful_queries as f64)
            .with_f64("disabled", summary.disabled as f64)
    }

    /// Emitted by the alert engine for every non-excluded result
    pub fn environment_check(result: &ProbeResult, failing: bool) -> Self {
        let status = if failing { "failure" } else { "success" };
        Self::new(format!(
            "Environment check {status}: {}",
            result.namespace()
        ))
        .with_str("type", "environment_check")
        .with_str("status", status)
        .with_str("namespace", result.namespace())
        .with_str("cluster", result.cluster())
        .with_str("login_page", result.login_page.as_str())
        .with_str("authorization", result.authorization.as_str())
        .with_str("message", result.message.as_str())
        .with_str("version", result.version.clone())
        .with_str("last_transaction", result.last_transaction_text.clone())
        .with_f64("query_time_s", result.query_time_secs as f64)
    }

    /// Emitted before an intent is handed to channels
    pub fn alert(intent: &AlertIntent) -> Self {
        Self::new(format!(
            "Alert {}: {} - {}",
            intent.kind, intent.environment, intent.reason
        ))
        .with_str("type", "alert")
        .with_str("alert_type", intent.kind.as_str())
        .with_str("namespace", intent.environment.clone())
        .with_str("cluster", intent.cluster.clone())
        .with_str("reason", intent.reason.clone())
    }

    pub fn system(event: &str) -> Self {
        Self::new(format!("System event: {event}"))
            .with_str("type", "system_event")
            .with_str("event", event)
    }
}

/// Something that accepts telemetry events
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event; `false` means it was dropped
    async fn send_event(&self, event: &TelemetryEvent) -> bool;

    async fn test_connection(&self) -> bool {
        self.send_event(&TelemetryEvent::system("connection_test")).await
    }
}

/// Sink that only writes to the local log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn send_event(&self, event: &TelemetryEvent) -> bool {
        debug!(content = %event.content, attributes = ?event.string_attributes, "telemetry event");
        true
    }
}

/// Events queued beyond this are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Cheap, cloneable handle that queues events for a background sink task
#[derive(Clone)]
pub struct TelemetryDispatcher {
    tx: Option<mpsc::Sender<TelemetryEvent>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl TelemetryDispatcher {
    /// Start the background task. It ends once every handle is dropped
    /// and the queue is drained.
    pub fn spawn(sink: Arc<dyn TelemetrySink>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`spawn`](Self::spawn) with an explicit queue bound
    pub fn spawn_with_capacity(
        sink: Arc<dyn TelemetrySink>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity.max(1));
        let worker_sink = Arc::clone(&sink);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !worker_sink.send_event(&event).await {
                    warn!(content = %event.content, "telemetry event not delivered");
                }
            }
        });

        (
            Self {
                tx: Some(tx),
                sink: Some(sink),
            },
            handle,
        )
    }

    /// Dispatcher that drops everything
    pub fn disabled() -> Self {
        Self { tx: None, sink: None }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.tx {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(content = %event.content, "telemetry queue full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("telemetry worker stopped, event dropped");
                }
            }
        }
    }

    pub async fn test_connection(&self) -> bool {
        match &self.sink {
            Some(sink) => sink.test_connection().await,
            None => false,
        }
    }
}

impl std::fmt::Debug for TelemetryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryDispatcher")
            .field("enabled", &self.tx.is_some())
            .finish()
    }
}

/// Test sink that keeps every event it is given
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub events: std::sync::Mutex<Vec<TelemetryEvent>>,
    pub accept: bool,
}

#[cfg(test)]
impl RecordingSink {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            events: Default::default(),
            accept: true,
        })
    }

    pub fn taken(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send_event(&self, event: &TelemetryEvent) -> bool {
        self.events.lock().unwrap().push(event.clone());
        self.accept
    }
}
