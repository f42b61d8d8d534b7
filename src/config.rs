use crate::error::Result;
use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub application_ids: ApplicationIds,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// URLs probed when a run is not given an explicit list
    #[serde(default)]
    pub environment_urls: Vec<String>,
    /// Where the CLI keeps the alert state between runs
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Login credentials shared by every tenant
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApplicationIds {
    /// Used when a URL has no specific entry
    #[serde(default)]
    pub default: Option<String>,
    /// Keyed by environment URL
    #[serde(default)]
    pub environment_specific: HashMap<String, String>,
}

impl ApplicationIds {
    /// `environment_specific[url]`, else the default. Blank values count as unset.
    pub fn resolve(&self, url: &str) -> Option<&str> {
        self.environment_specific
            .get(url)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                self.default
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
            })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Per-request budget in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Query answers slower than this fail the query step
    #[serde(default = "default_threshold_secs")]
    pub query_threshold_secs: u64,
    /// Probes run concurrently per window
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Environment-scoped login path, appended to the environment URL
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Shared login endpoint tried when the environment one returns 404
    #[serde(default = "default_shared_login_url")]
    pub shared_login_url: Option<String>,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_version_path")]
    pub version_path: String,
    #[serde(default = "default_query_path")]
    pub query_path: String,
    #[serde(default = "default_question")]
    pub question: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_request_timeout() -> u64 {
    60
}

fn default_threshold_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    3
}

fn default_login_path() -> String {
    "/api/frontegg/identity/resources/auth/v1/user".to_string()
}

fn default_shared_login_url() -> Option<String> {
    Some("https://gs-erag.frontegg.com/frontegg/identity/resources/auth/v1/user".to_string())
}

fn default_token_path() -> String {
    "/api/get-token".to_string()
}

fn default_version_path() -> String {
    "/api/version".to_string()
}

fn default_query_path() -> String {
    "/api/erag-backend/v1/toucan-sql/nlp-query".to_string()
}

fn default_question() -> String {
    "What is the last transaction date?".to_string()
}

fn default_user_id() -> String {
    "48b643e1-c6b7-48fd-b7c8-b1dbe0ad7d90".to_string()
}

fn default_model() -> String {
    "azure-openai-gpt4o-2024-08-06".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            query_threshold_secs: default_threshold_secs(),
            concurrency: default_concurrency(),
            login_path: default_login_path(),
            shared_login_url: default_shared_login_url(),
            token_path: default_token_path(),
            version_path: default_version_path(),
            query_path: default_query_path(),
            question: default_question(),
            user_id: default_user_id(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertingConfig {
    /// When false, state still moves but nothing is delivered
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Query time above this counts as a failure
    #[serde(default = "default_threshold_secs")]
    pub query_response_time_secs: u64,
    /// Minimum hours between reminders for an ongoing failure
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_hours: f64,
    /// Environment URLs never alerted on
    #[serde(default)]
    pub exclusions: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

fn default_reminder_interval() -> f64 {
    4.0
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_response_time_secs: default_threshold_secs(),
            reminder_interval_hours: default_reminder_interval(),
            exclusions: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub alert_channel_id: String,
    #[serde(default)]
    pub report_channel_id: String,
    #[serde(default = "default_slack_api")]
    pub api_base: String,
    /// Per-request budget in seconds
    #[serde(default = "default_delivery_timeout")]
    pub request_timeout_secs: u64,
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

fn default_delivery_timeout() -> u64 {
    30
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            alert_channel_id: String::new(),
            report_channel_id: String::new(),
            api_base: default_slack_api(),
            request_timeout_secs: default_delivery_timeout(),
        }
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("enabled", &self.enabled)
            .field("alert_channel_id", &self.alert_channel_id)
            .field("report_channel_id", &self.report_channel_id)
            .field("api_base", &self.api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub app_password: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sender: String::new(),
            app_password: String::new(),
            recipients: Vec::new(),
            smtp_host: default_smtp_host(),
        }
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("enabled", &self.enabled)
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .field("smtp_host", &self.smtp_host)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// JSON log ingestion endpoint
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_delivery_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            request_timeout_secs: default_delivery_timeout(),
        }
    }
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Minutes between monitoring cycles
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub daily_report: DailyReportConfig,
}

fn default_interval_minutes() -> u64 {
    5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            daily_report: DailyReportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DailyReportConfig {
    #[serde(default)]
    pub enabled: bool,
    /// UTC time of day, `HH:MM`
    #[serde(default = "default_report_time")]
    pub time: String,
}

fn default_report_time() -> String {
    "08:00".to_string()
}

impl Default for DailyReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: default_report_time(),
        }
    }
}

impl DailyReportConfig {
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M").ok()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FLEETWATCH_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FLEETWATCH_CREDENTIALS__EMAIL, etc.)
            .add_source(
                Environment::with_prefix("FLEETWATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Alert state location: configured path, else the user data dir
    pub fn state_file(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fleetwatch")
                .join("alert_state.json")
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.credentials.email.trim().is_empty() {
            errors.push("credentials.email is required".to_string());
        }
        if self.credentials.password.is_empty() {
            errors.push("credentials.password is required".to_string());
        }
        if self.probe.concurrency == 0 {
            errors.push("probe.concurrency must be at least 1".to_string());
        }
        if self.probe.request_timeout_secs == 0 {
            errors.push("probe.request_timeout_secs must be positive".to_string());
        }
        if self.schedule.interval_minutes == 0 {
            errors.push("schedule.interval_minutes must be positive".to_string());
        }
        if !self.alerting.reminder_interval_hours.is_finite()
            || self.alerting.reminder_interval_hours < 0.0
        {
            errors.push("alerting.reminder_interval_hours must be a non-negative number".to_string());
        }
        if self.schedule.daily_report.enabled && self.schedule.daily_report.time_of_day().is_none() {
            errors.push(format!(
                "schedule.daily_report.time '{}' is not HH:MM",
                self.schedule.daily_report.time
            ));
        }
        if self.channels.slack.enabled && self.channels.slack.bot_token.is_empty() {
            errors.push("channels.slack.bot_token is required when slack is enabled".to_string());
        }
        if self.channels.email.enabled
            && (self.channels.email.sender.is_empty() || self.channels.email.app_password.is_empty())
        {
            errors.push(
                "channels.email.sender and app_password are required when email is enabled"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Where a monitor gets its configuration from, once per cycle
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<AppConfig>;
}

/// Re-reads the config directory on every call
#[derive(Debug, Clone)]
pub struct ConfigDir(pub PathBuf);

impl ConfigSource for ConfigDir {
    fn load(&self) -> Result<AppConfig> {
        Ok(AppConfig::load_from(&self.0)?)
    }
}

/// A fixed configuration
#[derive(Debug, Clone)]
pub struct StaticConfig(pub AppConfig);

impl ConfigSource for StaticConfig {
    fn load(&self) -> Result<AppConfig> {
        Ok(self.0.clone())
    }
}
