//! Environment probe
//!
//! Runs the ordered health check against one environment:
//! login → login page → auth token → version → query.
//! Each step depends on the one before it, so the first failure ends the
//! probe and the remaining fields keep their failed defaults.

use crate::adapters::tenant::{Session, TenantClient};
use crate::config::{AppConfig, ApplicationIds, Credentials};
use crate::domain::{CheckStatus, LoginPageStatus, ProbeResult};
use crate::error::{ProbeError, Result};
use crate::services::telemetry::{TelemetryDispatcher, TelemetryEvent};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Probe steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    Disabled,
    Login,
    LoginPage,
    Authorization,
    Version,
    Message,
    Error,
}

impl ProbeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStep::Disabled => "disabled",
            ProbeStep::Login => "login",
            ProbeStep::LoginPage => "login_page",
            ProbeStep::Authorization => "authorization",
            ProbeStep::Version => "version",
            ProbeStep::Message => "message",
            ProbeStep::Error => "error",
        }
    }
}

impl std::fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health check for a single environment URL
#[derive(Clone)]
pub struct EnvironmentProbe {
    client: TenantClient,
    credentials: Credentials,
    application_ids: ApplicationIds,
    telemetry: TelemetryDispatcher,
}

impl EnvironmentProbe {
    pub fn new(
        client: TenantClient,
        credentials: Credentials,
        application_ids: ApplicationIds,
        telemetry: TelemetryDispatcher,
    ) -> Self {
        Self {
            client,
            credentials,
            application_ids,
            telemetry,
        }
    }

    pub fn from_config(config: &AppConfig, telemetry: TelemetryDispatcher) -> Result<Self> {
        Ok(Self::new(
            TenantClient::new(config.probe.clone())?,
            config.credentials.clone(),
            config.application_ids.clone(),
            telemetry,
        ))
    }

    /// Probe one environment. Always returns a result; failures are encoded
    /// in its status fields, unexpected ones behind an `Error: ` sentinel.
    pub async fn probe(&self, url: &str, exclusions: &BTreeSet<String>) -> ProbeResult {
        let checked_at = Utc::now();

        if exclusions.contains(url) {
            let result = ProbeResult::disabled(url, checked_at);
            debug!(url = %url, "environment excluded from testing");
            self.emit(ProbeStep::Disabled, &result, "Disabled", Duration::ZERO, None);
            return result;
        }

        let mut result = ProbeResult::pending(url, checked_at);
        let outcome = AssertUnwindSafe(self.run_steps(url, &mut result))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProbeError::Unexpected(panic_message(panic))));

        if let Err(e) = outcome {
            let message = e.to_string();
            warn!(url = %url, error = %message, "error testing environment");
            result.last_transaction_text = format!("Error: {message}");
            self.emit(ProbeStep::Error, &result, "Fail", Duration::ZERO, Some(&message));
        }

        info!(
            url = %url,
            login_page = %result.login_page,
            authorization = %result.authorization,
            message = %result.message,
            query_time_s = result.query_time_secs,
            "environment probed"
        );
        result
    }

    async fn run_steps(
        &self,
        url: &str,
        result: &mut ProbeResult,
    ) -> std::result::Result<(), ProbeError> {
        let application_id = self
            .application_ids
            .resolve(url)
            .ok_or(ProbeError::MissingApplicationId)?;

        let started = Instant::now();
        let session = self
            .client
            .login(url, &self.credentials, application_id)
            .await?;
        self.emit(ProbeStep::Login, result, "Success", started.elapsed(), None);

        let (login_page, elapsed) = self.client.check_login_page(url, &session).await;
        result.login_page = login_page;
        self.emit(ProbeStep::LoginPage, result, login_page.as_str(), elapsed, None);
        if login_page != LoginPageStatus::Live {
            return Ok(());
        }

        let (token, elapsed) = self.client.fetch_token(url, &session).await;
        result.authorization = CheckStatus::from_success(token.is_some());
        self.emit(
            ProbeStep::Authorization,
            result,
            result.authorization.as_str(),
            elapsed,
            None,
        );
        let Some(token) = token else {
            return Ok(());
        };

        self.version_step(url, &session, result).await;

        let threshold = self.client.config().query_threshold_secs;
        let outcome = self.client.query(url, &token, &session, threshold).await;
        result.message = outcome.status;
        result.query_time_secs = outcome.query_time_secs;
        result.last_transaction_text = outcome.answer;
        self.emit(
            ProbeStep::Message,
            result,
            result.message.as_str(),
            Duration::from_secs(result.query_time_secs),
            None,
        );

        Ok(())
    }

    async fn version_step(&self, url: &str, session: &Session, result: &mut ProbeResult) {
        let started = Instant::now();
        result.version = self.client.fetch_version(url, session).await;
        self.emit(ProbeStep::Version, result, &result.version, started.elapsed(), None);
    }

    fn emit(
        &self,
        step: ProbeStep,
        result: &ProbeResult,
        status: &str,
        elapsed: Duration,
        error: Option<&str>,
    ) {
        self.telemetry.emit(TelemetryEvent::check(
            step.as_str(),
            &result.url,
            status,
            result.namespace(),
            result.cluster(),
            elapsed,
            error,
        ));
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown error".to_string()
    }
}
