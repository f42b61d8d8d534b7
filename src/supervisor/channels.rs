//! Notification channels for alert intents and daily reports

use crate::adapters::email::EmailNotifier;
use crate::adapters::slack::SlackNotifier;
use crate::config::ChannelsConfig;
use crate::domain::{AlertIntent, ReportSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// A destination for alert intents and reports.
///
/// Implementations swallow their own transport errors and report the
/// outcome as a `bool`, so one broken channel never blocks the others.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_alert(&self, intent: &AlertIntent) -> bool;

    async fn send_report(&self, report: &ReportSnapshot) -> bool;

    async fn test_connection(&self) -> bool;
}

/// Build every channel that is enabled and fully configured.
/// A channel that cannot be built is skipped with a warning.
pub fn channels_from_config(config: &ChannelsConfig) -> Vec<Arc<dyn AlertChannel>> {
    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

    if config.slack.enabled {
        match SlackNotifier::from_config(&config.slack) {
            Some(slack) => channels.push(slack),
            None => warn!("Slack enabled but bot token or channel id missing, skipping"),
        }
    }

    if config.email.enabled {
        match EmailNotifier::from_config(&config.email) {
            Ok(Some(email)) => channels.push(email),
            Ok(None) => warn!("Email enabled but sender, password or recipients missing, skipping"),
            Err(e) => warn!(error = %e, "Email channel misconfigured, skipping"),
        }
    }

    info!(
        channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
        "alert channels configured"
    );
    channels
}
