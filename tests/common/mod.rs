//! In-process fake tenant for probe tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use fleetwatch::config::{ApplicationIds, Credentials, ProbeConfig};
use fleetwatch::services::telemetry::{TelemetryEvent, TelemetrySink};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LOGIN_PATH: &str = "/api/frontegg/identity/resources/auth/v1/user";
pub const SHARED_LOGIN_PATH: &str = "/shared/auth/v1/user";
pub const QUERY_PATH: &str = "/api/erag-backend/v1/toucan-sql/nlp-query";
const SESSION_COOKIE: &str = "fw_session=abc123";

/// Behaviour knobs for the fake tenant
pub struct TenantBehavior {
    /// Register the environment login route; absent means 404
    pub env_login: bool,
    pub login_status: StatusCode,
    pub login_delay: Duration,
    pub page_up: AtomicBool,
    pub token: String,
    pub version: Option<String>,
    pub query_delay: Duration,
    pub query_status: StatusCode,
    pub answer: String,
    pub requests: AtomicUsize,
    /// Queries currently being answered, and the most seen at once
    pub queries_in_flight: AtomicUsize,
    pub peak_queries: AtomicUsize,
}

impl Default for TenantBehavior {
    fn default() -> Self {
        Self {
            env_login: true,
            login_status: StatusCode::OK,
            login_delay: Duration::ZERO,
            page_up: AtomicBool::new(true),
            token: "tok-1".into(),
            version: Some("2.14.0".into()),
            query_delay: Duration::ZERO,
            query_status: StatusCode::OK,
            answer: "2025-01-15".into(),
            requests: AtomicUsize::new(0),
            queries_in_flight: AtomicUsize::new(0),
            peak_queries: AtomicUsize::new(0),
        }
    }
}

impl TenantBehavior {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn peak_queries(&self) -> usize {
        self.peak_queries.load(Ordering::SeqCst)
    }

    pub fn set_page_up(&self, up: bool) {
        self.page_up.store(up, Ordering::SeqCst);
    }
}

type Tenant = Arc<TenantBehavior>;

async fn login(State(t): State<Tenant>) -> impl IntoResponse {
    t.requests.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(t.login_delay).await;
    if t.login_status.is_success() {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, format!("{SESSION_COOKIE}; Path=/; HttpOnly"))],
            Json(json!({ "accessToken": "ignored" })),
        )
            .into_response()
    } else {
        (t.login_status, "bad credentials").into_response()
    }
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains(SESSION_COOKIE))
}

async fn page(State(t): State<Tenant>, headers: HeaderMap) -> StatusCode {
    t.requests.fetch_add(1, Ordering::SeqCst);
    if has_session(&headers) && t.page_up.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn token(State(t): State<Tenant>, headers: HeaderMap) -> impl IntoResponse {
    t.requests.fetch_add(1, Ordering::SeqCst);
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "token": t.token })).into_response()
}

async fn version(State(t): State<Tenant>) -> impl IntoResponse {
    t.requests.fetch_add(1, Ordering::SeqCst);
    match &t.version {
        Some(v) => Json(json!({ "version": v })).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn query(State(t): State<Tenant>, headers: HeaderMap) -> impl IntoResponse {
    t.requests.fetch_add(1, Ordering::SeqCst);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Token {}", t.token).as_str());
    if !authorized || headers.get("correlation-id").is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    let now = t.queries_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    t.peak_queries.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(t.query_delay).await;
    t.queries_in_flight.fetch_sub(1, Ordering::SeqCst);

    if !t.query_status.is_success() {
        return (t.query_status, "query failed").into_response();
    }
    Json(json!({ "nl_result": t.answer })).into_response()
}

/// Serve the fake tenant on an ephemeral port; returns its base URL
pub async fn spawn_tenant(behavior: Tenant) -> String {
    let mut app = Router::new()
        .route("/", get(page))
        .route("/api/get-token", get(token))
        .route("/api/version", get(version))
        .route(QUERY_PATH, post(query))
        .route(SHARED_LOGIN_PATH, post(login));
    if behavior.env_login {
        app = app.route(LOGIN_PATH, post(login));
    }
    let app = app.with_state(behavior);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn probe_config(base_url: &str) -> ProbeConfig {
    ProbeConfig {
        request_timeout_secs: 10,
        shared_login_url: Some(format!("{base_url}{SHARED_LOGIN_PATH}")),
        ..ProbeConfig::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        email: "probe@example.com".into(),
        password: "hunter2".into(),
    }
}

pub fn application_ids() -> ApplicationIds {
    ApplicationIds {
        default: Some("app-default".into()),
        ..ApplicationIds::default()
    }
}

/// Telemetry sink that keeps every event
#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.attr("test_type").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for CollectingSink {
    async fn send_event(&self, event: &TelemetryEvent) -> bool {
        self.events.lock().unwrap().push(event.clone());
        true
    }
}
