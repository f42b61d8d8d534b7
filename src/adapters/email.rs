//! SMTP email notifications

use crate::config::EmailConfig;
use crate::domain::{AlertIntent, AlertKind, ReportSnapshot};
use crate::error::Result;
use crate::supervisor::channels::AlertChannel;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{debug, error, info};

const CELL: &str = "padding: 10px; border-bottom: 1px solid #e5e7eb;";

/// Email notification client
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
}

/// A rendered email, before addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
}

impl EmailNotifier {
    /// Notifier from config; `Ok(None)` when sender, password or recipients
    /// are missing. Malformed addresses are an error.
    pub fn from_config(config: &EmailConfig) -> Result<Option<Arc<Self>>> {
        if config.sender.is_empty() || config.app_password.is_empty() || config.recipients.is_empty()
        {
            return Ok(None);
        }

        let sender: Mailbox = config.sender.parse()?;
        let recipients = config
            .recipients
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .credentials(Credentials::new(
                config.sender.clone(),
                config.app_password.clone(),
            ))
            .build();

        info!(smtp_host = %config.smtp_host, recipients = recipients.len(), "Email notifications enabled");
        Ok(Some(Arc::new(Self {
            transport,
            sender,
            recipients,
        })))
    }

    async fn send(&self, content: EmailContent, recipients: &[Mailbox]) -> bool {
        let builder = recipients.iter().cloned().fold(
            Message::builder()
                .from(self.sender.clone())
                .subject(content.subject.clone())
                .header(ContentType::TEXT_HTML),
            |builder, to| builder.to(to),
        );

        let message = match builder.body(content.html) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to build email: {}", e);
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                debug!(subject = %content.subject, "Email sent successfully");
                true
            }
            Err(e) => {
                error!("Failed to send email: {}", e);
                false
            }
        }
    }
}

/// Alert / recovery email body
pub fn render_alert(intent: &AlertIntent) -> EmailContent {
    let resolved = intent.kind == AlertKind::Resolved;
    let (subject, color, header, status) = if resolved {
        (
            format!("✅ Resolved: {}", intent.environment),
            "#059669",
            "✅ Environment Recovered",
            "✅ RECOVERED",
        )
    } else {
        (
            format!("🚨 Production Alert: {}", intent.environment),
            "#dc2626",
            "🚨 Production Environment Alert",
            "❌ FAILED",
        )
    };

    let reason_row = if resolved {
        String::new()
    } else {
        format!(
            r#"<tr><td style="padding: 10px; font-weight: bold;">Reason:</td><td style="padding: 10px;">{}</td></tr>"#,
            escape(&intent.display_reason())
        )
    };

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: {color}; color: white; padding: 20px; text-align: center;"><h1 style="margin: 0;">{header}</h1></div>
  <div style="padding: 20px; background: #f9fafb;">
    <table style="width: 100%; border-collapse: collapse;">
      <tr><td style="{CELL} font-weight: bold;">Environment:</td><td style="{CELL}">{env}</td></tr>
      <tr><td style="{CELL} font-weight: bold;">Cluster:</td><td style="{CELL}">{cluster}</td></tr>
      <tr><td style="{CELL} font-weight: bold;">Status:</td><td style="{CELL} color: {color};">{status}</td></tr>
      <tr><td style="{CELL} font-weight: bold;">Time:</td><td style="{CELL}">{time}</td></tr>
      {reason_row}
    </table>
  </div>
</div>"#,
        env = escape(&intent.environment),
        cluster = escape(&intent.cluster),
        time = intent.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    EmailContent { subject, html }
}

/// Daily report email body
pub fn render_report(report: &ReportSnapshot) -> EmailContent {
    let summary = report.summary();
    let date = report.generated_at.format("%Y-%m-%d");
    let health_color = if summary.live == summary.total {
        "#059669"
    } else {
        "#dc2626"
    };

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;">
  <div style="background: #2563eb; color: white; padding: 20px; text-align: center;">
    <h1 style="margin: 0;">📊 Daily Production Report</h1>
    <p style="margin: 10px 0 0 0;">{date}</p>
  </div>
  <div style="padding: 20px;">
    <h3 style="margin: 0; color: #1e40af;">Environment Health</h3>
    <p style="font-size: 24px; font-weight: bold; margin: 10px 0; color: {health_color};">{live}/{total}</p>
    <p style="margin: 0; color: #6b7280;">Environments Live</p>
    <p>Total nodes: {nodes} | Highest error rate: {rate:.1}% | Ongoing alerts: {ongoing}</p>
  </div>
</div>"#,
        live = summary.live,
        total = summary.total,
        nodes = report.total_nodes(),
        rate = report.highest_error_rate(),
        ongoing = report.ongoing_alerts,
    );

    EmailContent {
        subject: format!("📊 Daily Production Report - {date}"),
        html,
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl AlertChannel for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send_alert(&self, intent: &AlertIntent) -> bool {
        self.send(render_alert(intent), &self.recipients).await
    }

    async fn send_report(&self, report: &ReportSnapshot) -> bool {
        self.send(render_report(report), &self.recipients).await
    }

    async fn test_connection(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                error!("Email connection test failed: {}", e);
                false
            }
        }
    }
}
