//! Tenant REST API client
//!
//! Thin wrappers over the endpoints a probe touches. Every method maps
//! network and timeout errors into the step's own failure outcome; only
//! `login` reports an error, because nothing after it can run without a session.

use crate::config::{Credentials, ProbeConfig};
use crate::domain::{CheckStatus, LoginPageStatus, UNKNOWN_VERSION};
use crate::error::{ProbeError, Result};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Answers that come back 200 but mean the query did not work
pub const QUERY_FAILURE_PHRASES: &[&str] = &[
    "sorry, i didn't get that. please, try again.",
    "this request can't be processed because the limit for connected data was exceeded. please contact your administrator.",
];

/// Cookies captured at login, replayed on every later request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| {
                let pair = raw.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                let (name, value) = (name.trim(), value.trim());
                if name.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.to_string()))
                }
            })
            .collect();
        Self { cookies }
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self.cookie_header() {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }
}

/// Outcome of the query step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub status: CheckStatus,
    pub query_time_secs: u64,
    pub answer: String,
}

impl QueryOutcome {
    fn over_threshold(query_time_secs: u64, threshold_secs: u64) -> Self {
        Self {
            status: CheckStatus::Fail,
            query_time_secs,
            answer: format!("Response time exceeded threshold ({threshold_secs}s)"),
        }
    }
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "invitationToken")]
    invitation_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryPayload<'a> {
    query: &'a str,
    query_en: &'a str,
    queries_historical: Vec<String>,
    evidence: &'a str,
    model: &'a str,
    application_id: u32,
    skip_cache_search: bool,
    skip_schema_filtering: bool,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: Option<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    nl_result: Option<String>,
}

/// Client for one tenant's REST API surface
#[derive(Clone)]
pub struct TenantClient {
    client: Client,
    config: ProbeConfig,
}

impl TenantClient {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    fn login_candidates(&self, base_url: &str) -> Vec<String> {
        let mut candidates = vec![Self::endpoint(base_url, &self.config.login_path)];
        if let Some(shared) = self.config.shared_login_url.as_ref().filter(|u| !u.is_empty()) {
            candidates.push(shared.clone());
        }
        candidates
    }

    /// Authenticate, trying the environment endpoint first and the shared one on 404
    pub async fn login(
        &self,
        base_url: &str,
        credentials: &Credentials,
        application_id: &str,
    ) -> std::result::Result<Session, ProbeError> {
        let payload = LoginPayload {
            email: &credentials.email,
            password: &credentials.password,
            invitation_token: "",
        };

        for login_url in self.login_candidates(base_url) {
            let response = self
                .client
                .post(&login_url)
                .header("frontegg-requested-application-id", application_id)
                .header("frontegg-source", "login-box")
                .header(USER_AGENT, BROWSER_AGENT)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %login_url, "login accepted");
                    return Ok(Session::from_headers(resp.headers()));
                }
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    debug!(url = %login_url, "login endpoint not found, trying next");
                    continue;
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ProbeError::LoginRejected { status, body });
                }
                Err(e) if e.is_timeout() => return Err(ProbeError::LoginTimeout),
                Err(e) => {
                    warn!(url = %login_url, error = %e, "login request failed, trying next");
                    continue;
                }
            }
        }

        Err(ProbeError::LoginExhausted)
    }

    /// GET the environment root. Live iff 2xx.
    pub async fn check_login_page(
        &self,
        base_url: &str,
        session: &Session,
    ) -> (LoginPageStatus, Duration) {
        let start = Instant::now();
        let response = session.apply(self.client.get(base_url)).send().await;
        let status = match response {
            Ok(resp) if resp.status().is_success() => LoginPageStatus::Live,
            Ok(resp) => {
                debug!(url = %base_url, status = %resp.status(), "login page not live");
                LoginPageStatus::NotLive
            }
            Err(e) => {
                debug!(url = %base_url, error = %e, "login page unreachable");
                LoginPageStatus::NotLive
            }
        };
        (status, start.elapsed())
    }

    /// Fetch the API token. `None` covers every failure, including an empty token.
    pub async fn fetch_token(&self, base_url: &str, session: &Session) -> (Option<String>, Duration) {
        let start = Instant::now();
        let url = Self::endpoint(base_url, &self.config.token_path);

        let token = match session.apply(self.client.get(&url)).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<TokenResponse>().await {
                Ok(body) => body.token.filter(|t| !t.is_empty()),
                Err(e) => {
                    debug!(url = %url, error = %e, "token response unreadable");
                    None
                }
            },
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "token request rejected");
                None
            }
            Err(e) => {
                debug!(url = %url, error = %e, "token request failed");
                None
            }
        };

        (token, start.elapsed())
    }

    /// Best-effort version lookup
    pub async fn fetch_version(&self, base_url: &str, session: &Session) -> String {
        let url = Self::endpoint(base_url, &self.config.version_path);

        match session.apply(self.client.get(&url)).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<VersionResponse>()
                .await
                .ok()
                .and_then(|body| body.version)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            Ok(_) => UNKNOWN_VERSION.to_string(),
            Err(e) => {
                warn!(url = %url, error = %e, "failed to get version");
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    /// Query budget: the request timeout, stretched past the threshold so a
    /// slow answer is still classified as over threshold rather than timed out.
    fn query_budget(&self, threshold_secs: u64) -> Duration {
        Duration::from_secs(
            self.config
                .request_timeout_secs
                .max(threshold_secs.saturating_add(1)),
        )
    }

    /// Ask the tenant the probe question.
    ///
    /// Failure order: HTTP status, then response time over `threshold_secs`,
    /// then a known failure phrase in the answer.
    pub async fn query(
        &self,
        base_url: &str,
        token: &str,
        session: &Session,
        threshold_secs: u64,
    ) -> QueryOutcome {
        let url = Self::endpoint(base_url, &self.config.query_path);
        let payload = QueryPayload {
            query: &self.config.question,
            query_en: "",
            queries_historical: Vec::new(),
            evidence: "",
            model: &self.config.model,
            application_id: 1,
            skip_cache_search: true,
            skip_schema_filtering: true,
        };
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let start = Instant::now();
        let request = self
            .client
            .post(&url)
            .timeout(self.query_budget(threshold_secs))
            .header("Authorization", format!("Token {token}"))
            .header("User-id", &self.config.user_id)
            .header("accept", "application/json")
            .header("correlation-id", &correlation_id)
            .json(&payload);
        let response = session.apply(request).send().await;
        let query_time_secs = round_secs(start.elapsed());

        let resp = match response {
            Ok(resp) => resp,
            Err(_) if query_time_secs > threshold_secs => {
                return QueryOutcome::over_threshold(query_time_secs, threshold_secs)
            }
            Err(e) => {
                return QueryOutcome {
                    status: CheckStatus::Fail,
                    query_time_secs,
                    answer: e.to_string(),
                }
            }
        };

        if !resp.status().is_success() {
            return QueryOutcome {
                status: CheckStatus::Fail,
                query_time_secs,
                answer: format!("HTTP Error: {}", resp.status()),
            };
        }

        if query_time_secs > threshold_secs {
            return QueryOutcome::over_threshold(query_time_secs, threshold_secs);
        }

        match resp.json::<QueryResponse>().await {
            Ok(body) => {
                let answer = body
                    .nl_result
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| "No answer found".to_string());
                QueryOutcome {
                    status: CheckStatus::from_success(!is_failure_answer(&answer)),
                    query_time_secs,
                    answer,
                }
            }
            Err(e) => QueryOutcome {
                status: CheckStatus::Fail,
                query_time_secs,
                answer: e.to_string(),
            },
        }
    }
}

/// Whole seconds, half rounding up
pub fn round_secs(elapsed: Duration) -> u64 {
    elapsed.as_secs_f64().round() as u64
}

pub fn is_failure_answer(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    QUERY_FAILURE_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}
