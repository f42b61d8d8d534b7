//! Stateful alert engine
//!
//! Turns a batch of probe results and the prior alert state into a new
//! state plus the alert intents for this cycle. State transitions are
//! decided first and synchronously; delivery happens afterwards and its
//! outcome never changes the committed state.

use crate::config::AlertingConfig;
use crate::domain::{
    AlertIntent, AlertKind, AlertRecord, AlertState, CheckStatus, LoginPageStatus, ProbeResult,
    ReportSnapshot, RECOVERED_REASON,
};
use crate::services::telemetry::{TelemetryDispatcher, TelemetryEvent};
use crate::supervisor::channels::AlertChannel;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one channel send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub channel: String,
    pub environment: String,
    pub kind: AlertKind,
    pub delivered: bool,
}

/// Everything one engine pass produced
#[derive(Debug, Clone, Default)]
pub struct AlertOutcome {
    pub state: AlertState,
    pub intents: Vec<AlertIntent>,
    pub deliveries: Vec<Delivery>,
}

/// Connectivity of one notification or telemetry target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub connected: bool,
}

/// Whether a result violates any health condition
pub fn is_failing(result: &ProbeResult, threshold_secs: u64) -> bool {
    result.login_page != LoginPageStatus::Live
        || result.authorization != CheckStatus::Success
        || result.message != CheckStatus::Success
        || result.query_time_secs > threshold_secs
}

/// Every violated condition with its observed value, comma-joined
pub fn failure_reason(result: &ProbeResult, threshold_secs: u64) -> String {
    let mut reasons = Vec::new();
    if result.login_page != LoginPageStatus::Live {
        reasons.push(format!("Login page: {}", result.login_page));
    }
    if result.authorization != CheckStatus::Success {
        reasons.push(format!("Authorization: {}", result.authorization));
    }
    if result.message != CheckStatus::Success {
        reasons.push(format!("Message: {}", result.message));
    }
    if result.query_time_secs > threshold_secs {
        reasons.push(format!(
            "Query timeout: {}s > {}s",
            result.query_time_secs, threshold_secs
        ));
    }

    if reasons.is_empty() {
        "Unknown failure".to_string()
    } else {
        reasons.join(", ")
    }
}

/// Results the engine looks at: not excluded by alerting config, not disabled
fn considered<'a>(
    config: &'a AlertingConfig,
    results: &'a [ProbeResult],
) -> impl Iterator<Item = &'a ProbeResult> + 'a {
    results
        .iter()
        .filter(|r| !config.exclusions.contains(&r.url) && !r.is_disabled())
}

/// Pure state transition for one cycle
pub fn evaluate(
    config: &AlertingConfig,
    results: &[ProbeResult],
    prior: &AlertState,
    now: DateTime<Utc>,
) -> (AlertState, Vec<AlertIntent>) {
    let threshold = config.query_response_time_secs;
    let mut state = prior.clone();
    let mut intents = Vec::new();

    for result in considered(config, results) {
        let key = result.identity.key();
        let failing = is_failing(result, threshold);
        let existing = state.get(&key).filter(|r| r.is_failing()).cloned();

        match (failing, existing) {
            (true, None) => {
                let reason = failure_reason(result, threshold);
                info!(environment = %key, reason = %reason, "new failure");
                intents.push(AlertIntent::new(
                    result.namespace(),
                    result.cluster(),
                    &reason,
                    AlertKind::New,
                    now,
                ));
                state.insert(
                    key,
                    AlertRecord::failing(result.namespace(), result.cluster(), reason, now),
                );
            }
            (true, Some(mut record)) => {
                let anchor = record.reminder_anchor().unwrap_or_else(|| {
                    warn!(environment = %key, "failing record has no timestamps");
                    now
                });
                let hours = (now - anchor).num_milliseconds() as f64 / 3_600_000.0;
                if hours >= config.reminder_interval_hours {
                    let reason = record.reason.clone().unwrap_or_else(|| "Unknown".to_string());
                    debug!(environment = %key, hours, "reminder due");
                    intents.push(AlertIntent::new(
                        &record.namespace,
                        &record.cluster,
                        &reason,
                        AlertKind::Reminder,
                        now,
                    ));
                    record.last_reminder_at = Some(now);
                    state.insert(key, record);
                }
            }
            (false, Some(record)) => {
                info!(environment = %key, "environment recovered");
                intents.push(AlertIntent::new(
                    &record.namespace,
                    &record.cluster,
                    RECOVERED_REASON,
                    AlertKind::Resolved,
                    now,
                ));
                state.remove(&key);
            }
            (false, None) => {}
        }
    }

    (state, intents)
}

/// Applies [`evaluate`] and fans intents out to every channel
pub struct AlertEngine {
    channels: Vec<Arc<dyn AlertChannel>>,
    telemetry: TelemetryDispatcher,
}

impl AlertEngine {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>, telemetry: TelemetryDispatcher) -> Self {
        Self {
            channels,
            telemetry,
        }
    }

    pub fn channels(&self) -> &[Arc<dyn AlertChannel>] {
        &self.channels
    }

    /// Evaluate one cycle, then deliver its intents when alerting is enabled.
    /// The returned state is committed regardless of delivery results.
    pub async fn process(
        &self,
        config: &AlertingConfig,
        results: &[ProbeResult],
        prior: &AlertState,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        let threshold = config.query_response_time_secs;
        for result in considered(config, results) {
            self.telemetry.emit(TelemetryEvent::environment_check(
                result,
                is_failing(result, threshold),
            ));
        }

        let (state, intents) = evaluate(config, results, prior, now);

        let mut deliveries = Vec::new();
        if config.enabled {
            for intent in &intents {
                deliveries.extend(self.deliver(intent).await);
            }
        } else if !intents.is_empty() {
            info!(count = intents.len(), "alerting disabled, intents not delivered");
        }

        AlertOutcome {
            state,
            intents,
            deliveries,
        }
    }

    async fn deliver(&self, intent: &AlertIntent) -> Vec<Delivery> {
        self.telemetry.emit(TelemetryEvent::alert(intent));

        let sends = self.channels.iter().map(|channel| async move {
            let delivered = channel.send_alert(intent).await;
            if !delivered {
                warn!(
                    channel = channel.name(),
                    environment = %intent.environment,
                    kind = %intent.kind,
                    "alert delivery failed"
                );
            }
            Delivery {
                channel: channel.name().to_string(),
                environment: intent.environment.clone(),
                kind: intent.kind,
                delivered,
            }
        });

        join_all(sends).await
    }

    /// Send the daily report on every channel
    pub async fn send_report(&self, report: &ReportSnapshot) -> Vec<ConnectionStatus> {
        self.telemetry.emit(TelemetryEvent::system("daily_report"));

        let sends = self.channels.iter().map(|channel| async move {
            let delivered = channel.send_report(report).await;
            if !delivered {
                warn!(channel = channel.name(), "daily report delivery failed");
            }
            ConnectionStatus {
                name: channel.name().to_string(),
                connected: delivered,
            }
        });

        join_all(sends).await
    }

    /// Probe every channel plus the telemetry sink
    pub async fn test_connections(&self) -> Vec<ConnectionStatus> {
        let checks = self.channels.iter().map(|channel| async move {
            ConnectionStatus {
                name: channel.name().to_string(),
                connected: channel.test_connection().await,
            }
        });

        let mut statuses = join_all(checks).await;
        statuses.push(ConnectionStatus {
            name: "telemetry".to_string(),
            connected: self.telemetry.test_connection().await,
        });
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertStatus;
    use crate::services::telemetry::RecordingSink;
    use crate::supervisor::channels::MockAlertChannel;
    use chrono::{Duration, TimeZone};

    const URL: &str = "https://ns1.clusterA.example.net";
    const KEY: &str = "ns1-clusterA";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    fn healthy(url: &str) -> ProbeResult {
        ProbeResult {
            login_page: LoginPageStatus::Live,
            authorization: CheckStatus::Success,
            message: CheckStatus::Success,
            query_time_secs: 3,
            last_transaction_text: "2025-01-15".into(),
            ..ProbeResult::pending(url, t0())
        }
    }

    fn login_down(url: &str) -> ProbeResult {
        ProbeResult {
            login_page: LoginPageStatus::NotLive,
            ..healthy(url)
        }
    }

    #[test]
    fn test_failure_reason_lists_every_violation() {
        let result = ProbeResult {
            login_page: LoginPageStatus::NotLive,
            query_time_secs: 75,
            ..healthy(URL)
        };
        assert_eq!(
            failure_reason(&result, 60),
            "Login page: Not Live, Query timeout: 75s > 60s"
        );
        assert_eq!(failure_reason(&healthy(URL), 60), "Unknown failure");
    }

    #[test]
    fn test_slow_success_is_failing() {
        let result = ProbeResult {
            query_time_secs: 61,
            ..healthy(URL)
        };
        assert!(is_failing(&result, 60));
        assert!(!is_failing(&healthy(URL), 60));
    }

    #[test]
    fn test_new_then_reminder_then_resolved() {
        let config = AlertingConfig::default();

        let (state, intents) = evaluate(&config, &[login_down(URL)], &AlertState::new(), t0());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, AlertKind::New);
        let record = state.get(KEY).unwrap();
        assert_eq!(record.status, AlertStatus::Fail);
        assert_eq!(record.reason.as_deref(), Some("Login page: Not Live"));
        assert_eq!(record.first_failure_at, Some(t0()));

        // Two cycles inside the interval: nothing.
        let (state, intents) = evaluate(
            &config,
            &[login_down(URL)],
            &state,
            t0() + Duration::minutes(5),
        );
        assert!(intents.is_empty());
        let (state, intents) = evaluate(
            &config,
            &[login_down(URL)],
            &state,
            t0() + Duration::minutes(10),
        );
        assert!(intents.is_empty());

        // A different cause later still reminds with the original reason.
        let timed_out = ProbeResult {
            message: CheckStatus::Fail,
            ..healthy(URL)
        };
        let t5 = t0() + Duration::hours(5);
        let (state, intents) = evaluate(&config, &[timed_out], &state, t5);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, AlertKind::Reminder);
        assert_eq!(intents[0].reason, "Login page: Not Live");
        assert_eq!(state.get(KEY).unwrap().last_reminder_at, Some(t5));
        assert_eq!(state.get(KEY).unwrap().first_failure_at, Some(t0()));

        let (state, intents) = evaluate(
            &config,
            &[healthy(URL)],
            &state,
            t0() + Duration::hours(8),
        );
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, AlertKind::Resolved);
        assert_eq!(intents[0].reason, RECOVERED_REASON);
        assert!(!state.contains_key(KEY));
    }

    #[test]
    fn test_evaluate_is_idempotent_within_interval() {
        let config = AlertingConfig::default();
        let results = [login_down(URL), healthy("https://ns2.clusterB.example.net")];

        let (first, intents) = evaluate(&config, &results, &AlertState::new(), t0());
        assert_eq!(intents.len(), 1);

        let (second, intents) = evaluate(&config, &results, &first, t0());
        assert!(intents.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_healthy_without_record_is_noop() {
        let (state, intents) = evaluate(
            &AlertingConfig::default(),
            &[healthy(URL)],
            &AlertState::new(),
            t0(),
        );
        assert!(intents.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_healthy_keeps_non_failing_record() {
        let mut prior = AlertState::new();
        prior.insert(
            KEY.to_string(),
            AlertRecord {
                status: AlertStatus::Success,
                first_failure_at: None,
                last_reminder_at: None,
                namespace: "ns1".into(),
                cluster: "clusterA".into(),
                reason: None,
            },
        );

        let (state, intents) = evaluate(&AlertingConfig::default(), &[healthy(URL)], &prior, t0());
        assert!(intents.is_empty());
        assert_eq!(state, prior);
    }

    #[test]
    fn test_failing_record_without_timestamps_is_left_alone() {
        let mut prior = AlertState::new();
        prior.insert(
            KEY.to_string(),
            AlertRecord {
                first_failure_at: None,
                last_reminder_at: None,
                ..AlertRecord::failing("ns1", "clusterA", "Login page: Not Live".into(), t0())
            },
        );

        let (state, intents) = evaluate(&AlertingConfig::default(), &[login_down(URL)], &prior, t0());
        assert!(intents.is_empty());
        assert_eq!(state, prior);
    }

    #[test]
    fn test_excluded_and_disabled_results_are_skipped() {
        let mut config = AlertingConfig::default();
        config.exclusions.insert(URL.to_string());

        let disabled = ProbeResult::disabled("https://ns2.clusterB.example.net", t0());
        let (state, intents) =
            evaluate(&config, &[login_down(URL), disabled], &AlertState::new(), t0());
        assert!(intents.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_fractional_reminder_interval() {
        let config = AlertingConfig {
            reminder_interval_hours: 0.5,
            ..AlertingConfig::default()
        };
        let (state, _) = evaluate(&config, &[login_down(URL)], &AlertState::new(), t0());

        let (_, intents) = evaluate(
            &config,
            &[login_down(URL)],
            &state,
            t0() + Duration::minutes(29),
        );
        assert!(intents.is_empty());

        let (_, intents) = evaluate(
            &config,
            &[login_down(URL)],
            &state,
            t0() + Duration::minutes(30),
        );
        assert_eq!(intents[0].kind, AlertKind::Reminder);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_block_others() {
        let mut broken = MockAlertChannel::new();
        broken.expect_name().return_const("slack");
        broken.expect_send_alert().times(1).returning(|_| false);

        let mut working = MockAlertChannel::new();
        working.expect_name().return_const("email");
        working.expect_send_alert().times(1).returning(|_| true);

        let engine = AlertEngine::new(
            vec![
                Arc::new(broken) as Arc<dyn AlertChannel>,
                Arc::new(working),
            ],
            TelemetryDispatcher::disabled(),
        );
        let outcome = engine
            .process(
                &AlertingConfig::default(),
                &[login_down(URL)],
                &AlertState::new(),
                t0(),
            )
            .await;

        assert!(outcome.state.contains_key(KEY));
        assert_eq!(outcome.deliveries.len(), 2);
        assert!(!outcome.deliveries[0].delivered);
        assert!(outcome.deliveries[1].delivered);
    }

    #[tokio::test]
    async fn test_disabled_alerting_moves_state_without_delivery() {
        let mut channel = MockAlertChannel::new();
        channel.expect_name().return_const("slack");
        channel.expect_send_alert().never();

        let sink = RecordingSink::accepting();
        let (telemetry, worker) = TelemetryDispatcher::spawn(sink.clone());
        let engine = AlertEngine::new(vec![Arc::new(channel) as Arc<dyn AlertChannel>], telemetry);
        let config = AlertingConfig {
            enabled: false,
            ..AlertingConfig::default()
        };

        let outcome = engine
            .process(&config, &[login_down(URL)], &AlertState::new(), t0())
            .await;
        assert_eq!(outcome.intents.len(), 1);
        assert!(outcome.deliveries.is_empty());
        assert!(outcome.state.contains_key(KEY));

        drop(engine);
        worker.await.unwrap();
        let events = sink.taken();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attr("type"), Some("environment_check"));
        assert_eq!(events[0].attr("status"), Some("failure"));
    }

    #[tokio::test]
    async fn test_alert_event_precedes_delivery() {
        let mut channel = MockAlertChannel::new();
        channel.expect_name().return_const("slack");
        channel.expect_send_alert().returning(|_| true);

        let sink = RecordingSink::accepting();
        let (telemetry, worker) = TelemetryDispatcher::spawn(sink.clone());
        let engine = AlertEngine::new(vec![Arc::new(channel) as Arc<dyn AlertChannel>], telemetry);

        engine
            .process(
                &AlertingConfig::default(),
                &[login_down(URL)],
                &AlertState::new(),
                t0(),
            )
            .await;
        drop(engine);
        worker.await.unwrap();

        let kinds: Vec<_> = sink
            .taken()
            .iter()
            .map(|e| e.attr("type").unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds, vec!["environment_check", "alert"]);
    }

    #[tokio::test]
    async fn test_connections_include_telemetry() {
        let mut channel = MockAlertChannel::new();
        channel.expect_name().return_const("slack");
        channel.expect_test_connection().returning(|| true);

        let engine = AlertEngine::new(vec![Arc::new(channel) as Arc<dyn AlertChannel>], TelemetryDispatcher::disabled());
        let statuses = engine.test_connections().await;
        assert_eq!(
            statuses,
            vec![
                ConnectionStatus {
                    name: "slack".into(),
                    connected: true
                },
                ConnectionStatus {
                    name: "telemetry".into(),
                    connected: false
                },
            ]
        );
    }
}
