//! Output formatting for CLI commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use crate::domain::{AlertIntent, AlertState, ProbeResult};
use crate::supervisor::alert_engine::ConnectionStatus;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// One probe result as a table row
#[derive(Debug, Tabled, Serialize)]
pub struct ResultRow {
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Cluster")]
    pub cluster: String,
    #[tabled(rename = "Region")]
    pub region: String,
    #[tabled(rename = "Login Page")]
    pub login_page: String,
    #[tabled(rename = "Auth")]
    pub authorization: String,
    #[tabled(rename = "Query")]
    pub message: String,
    #[tabled(rename = "Time (s)")]
    pub query_time_secs: u64,
    #[tabled(rename = "Version")]
    pub version: String,
    #[tabled(rename = "Last Transaction")]
    pub last_transaction: String,
}

impl From<&ProbeResult> for ResultRow {
    fn from(r: &ProbeResult) -> Self {
        Self {
            namespace: r.namespace().to_string(),
            cluster: r.cluster().to_string(),
            region: r.identity.region.to_string(),
            login_page: r.login_page.to_string(),
            authorization: r.authorization.to_string(),
            message: r.message.to_string(),
            query_time_secs: r.query_time_secs,
            version: r.version.clone(),
            last_transaction: r.last_transaction_text.clone(),
        }
    }
}

/// One alert record as a table row
#[derive(Debug, Tabled, Serialize)]
pub struct AlertRow {
    #[tabled(rename = "Environment")]
    pub key: String,
    #[tabled(rename = "Failing Since")]
    pub since: String,
    #[tabled(rename = "Last Reminder")]
    pub last_reminder: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

pub fn alert_rows(state: &AlertState) -> Vec<AlertRow> {
    let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    state
        .ongoing()
        .map(|(key, record)| AlertRow {
            key: key.clone(),
            since: stamp(record.first_failure_at),
            last_reminder: stamp(record.last_reminder_at),
            reason: record.reason.clone().unwrap_or_default(),
        })
        .collect()
}

/// One alert intent as a table row
#[derive(Debug, Tabled, Serialize)]
pub struct IntentRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Environment")]
    pub environment: String,
    #[tabled(rename = "Cluster")]
    pub cluster: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&AlertIntent> for IntentRow {
    fn from(i: &AlertIntent) -> Self {
        Self {
            kind: i.kind.to_string(),
            environment: i.environment.clone(),
            cluster: i.cluster.clone(),
            reason: i.display_reason(),
        }
    }
}

/// Channel connectivity as a table row
#[derive(Debug, Tabled, Serialize)]
pub struct ConnectionRow {
    #[tabled(rename = "Target")]
    pub name: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&ConnectionStatus> for ConnectionRow {
    fn from(s: &ConnectionStatus) -> Self {
        Self {
            name: s.name.clone(),
            status: if s.connected { "connected" } else { "unreachable" }.to_string(),
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}
