//! Slack bot notifications
//!
//! Posts Block Kit messages through `chat.postMessage` with a bot token.

use crate::config::SlackConfig;
use crate::domain::{AlertIntent, AlertKind, ReportSnapshot};
use crate::supervisor::channels::AlertChannel;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Slack notification client
#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    alert_channel: String,
    report_channel: String,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    /// Notifier from config; `None` when the token or alert channel is missing.
    /// Reports go to the alert channel when no report channel is set.
    pub fn from_config(config: &SlackConfig) -> Option<Arc<Self>> {
        if config.bot_token.is_empty() || config.alert_channel_id.is_empty() {
            return None;
        }
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Slack HTTP client could not be built: {}", e);
                return None;
            }
        };
        info!("Slack notifications enabled");
        let report_channel = if config.report_channel_id.is_empty() {
            config.alert_channel_id.clone()
        } else {
            config.report_channel_id.clone()
        };
        Some(Arc::new(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            alert_channel: config.alert_channel_id.clone(),
            report_channel,
        }))
    }

    /// Post one message
    pub async fn send_message(&self, message: &Value) -> Result<(), String> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                error!("Slack request failed: {}", e);
                e.to_string()
            })?;

        let body: SlackResponse = resp.json().await.map_err(|e| {
            error!("Slack response unreadable: {}", e);
            e.to_string()
        })?;

        if body.ok {
            debug!("Slack notification sent successfully");
            Ok(())
        } else {
            let reason = body.error.unwrap_or_else(|| "unknown_error".to_string());
            error!("Slack API error: {}", reason);
            Err(reason)
        }
    }

    fn alert_message(&self, intent: &AlertIntent) -> Value {
        let (header, status, footer) = match intent.kind {
            AlertKind::Resolved => (
                "✅ Environment Recovered",
                "✅ RECOVERED",
                "🎉 No action needed",
            ),
            AlertKind::New | AlertKind::Reminder => (
                "🚨 Production Environment Alert",
                "❌ FAILED",
                "🔍 Please investigate immediately",
            ),
        };
        let fallback = match intent.kind {
            AlertKind::Resolved => format!("✅ Resolved: {}", intent.environment),
            _ => format!("🚨 Production Alert: {}", intent.environment),
        };

        json!({
            "channel": self.alert_channel,
            "text": fallback,
            "blocks": [
                { "type": "header", "text": { "type": "plain_text", "text": header } },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Environment:*\n{}", intent.environment) },
                        { "type": "mrkdwn", "text": format!("*Cluster:*\n{}", intent.cluster) },
                        { "type": "mrkdwn", "text": format!("*Status:*\n{status}") },
                        { "type": "mrkdwn", "text": format!("*Time:*\n{}", intent.timestamp.format("%Y-%m-%d %H:%M:%S UTC")) },
                    ]
                },
                { "type": "section", "text": { "type": "mrkdwn", "text": format!("*Reason:* {}", intent.display_reason()) } },
                { "type": "divider" },
                { "type": "context", "elements": [ { "type": "mrkdwn", "text": footer } ] },
            ]
        })
    }

    fn report_message(&self, report: &ReportSnapshot) -> Value {
        let summary = report.summary();
        let title = format!(
            "📊 Daily Production Report - {}",
            report.generated_at.format("%Y-%m-%d")
        );

        json!({
            "channel": self.report_channel,
            "text": title,
            "blocks": [
                { "type": "header", "text": { "type": "plain_text", "text": title } },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Environment Health:*\n{}/{} Live", summary.live, summary.total) },
                        { "type": "mrkdwn", "text": format!("*Total Nodes:*\n{}", report.total_nodes()) },
                        { "type": "mrkdwn", "text": format!("*Highest Error Rate:*\n{:.1}%", report.highest_error_rate()) },
                        { "type": "mrkdwn", "text": format!("*Ongoing Alerts:*\n{}", report.ongoing_alerts) },
                    ]
                },
            ]
        })
    }
}

#[async_trait]
impl AlertChannel for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send_alert(&self, intent: &AlertIntent) -> bool {
        self.send_message(&self.alert_message(intent)).await.is_ok()
    }

    async fn send_report(&self, report: &ReportSnapshot) -> bool {
        self.send_message(&self.report_message(report)).await.is_ok()
    }

    async fn test_connection(&self) -> bool {
        let url = format!("{}/auth.test", self.api_base);
        match self.client.post(&url).bearer_auth(&self.bot_token).send().await {
            Ok(resp) => match resp.json::<SlackResponse>().await {
                Ok(body) => body.ok,
                Err(e) => {
                    error!("Slack connection test failed: {}", e);
                    false
                }
            },
            Err(e) => {
                error!("Slack connection test failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertState;
    use chrono::Utc;

    fn notifier(report_channel: &str) -> Arc<SlackNotifier> {
        SlackNotifier::from_config(&SlackConfig {
            enabled: true,
            bot_token: "xoxb-test".into(),
            alert_channel_id: "C-ALERT".into(),
            report_channel_id: report_channel.into(),
            ..SlackConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reminder_reason_is_prefixed() {
        let intent = AlertIntent::new(
            "ns1",
            "clusterA",
            "Login page: Not Live",
            AlertKind::Reminder,
            Utc::now(),
        );
        let message = notifier("").alert_message(&intent);
        assert_eq!(message["channel"], "C-ALERT");
        assert_eq!(
            message["blocks"][2]["text"]["text"],
            "*Reason:* [REMINDER] Login page: Not Live"
        );
    }

    #[test]
    fn test_resolved_header() {
        let intent = AlertIntent::new(
            "ns1",
            "clusterA",
            crate::domain::RECOVERED_REASON,
            AlertKind::Resolved,
            Utc::now(),
        );
        let message = notifier("").alert_message(&intent);
        assert_eq!(message["blocks"][0]["text"]["text"], "✅ Environment Recovered");
    }

    #[tokio::test]
    async fn test_unresponsive_api_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let slack = SlackNotifier::from_config(&SlackConfig {
            enabled: true,
            bot_token: "xoxb-test".into(),
            alert_channel_id: "C-ALERT".into(),
            api_base: format!("http://{addr}"),
            request_timeout_secs: 1,
            ..SlackConfig::default()
        })
        .unwrap();
        let intent = AlertIntent::new("ns1", "clusterA", "Login page: Not Live", AlertKind::New, Utc::now());

        let delivered = tokio::time::timeout(Duration::from_secs(10), slack.send_alert(&intent))
            .await
            .expect("send_alert hung past the request timeout");
        assert!(!delivered);

        let connected = tokio::time::timeout(Duration::from_secs(10), slack.test_connection())
            .await
            .expect("test_connection hung past the request timeout");
        assert!(!connected);
    }

    #[test]
    fn test_report_uses_report_channel() {
        let report = ReportSnapshot::new(Vec::new(), &AlertState::new(), Utc::now());
        assert_eq!(notifier("C-REPORT").report_message(&report)["channel"], "C-REPORT");
        assert_eq!(notifier("").report_message(&report)["channel"], "C-ALERT");
    }
}
