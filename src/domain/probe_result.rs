use super::identity::EnvironmentIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const UNKNOWN_VERSION: &str = "Unknown";

/// Outcome of the login page check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginPageStatus {
    Live,
    #[serde(rename = "Not Live")]
    NotLive,
    Disabled,
}

impl LoginPageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginPageStatus::Live => "Live",
            LoginPageStatus::NotLive => "Not Live",
            LoginPageStatus::Disabled => "Disabled",
        }
    }
}

impl fmt::Display for LoginPageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the authorization and query steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    Success,
    Fail,
    Disabled,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "Success",
            CheckStatus::Fail => "Fail",
            CheckStatus::Disabled => "Disabled",
        }
    }

    pub fn from_success(ok: bool) -> Self {
        if ok {
            CheckStatus::Success
        } else {
            CheckStatus::Fail
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A batch of URLs to probe, plus the ones to report as disabled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub urls: Vec<String>,
    #[serde(default)]
    pub exclusions: BTreeSet<String>,
}

impl ProbeTarget {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            exclusions: BTreeSet::new(),
        }
    }

    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = exclusions.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclusions.contains(url)
    }
}

/// Result of probing one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(flatten)]
    pub identity: EnvironmentIdentity,
    pub url: String,
    pub login_page: LoginPageStatus,
    pub authorization: CheckStatus,
    pub message: CheckStatus,
    pub query_time_secs: u64,
    pub version: String,
    pub last_transaction_text: String,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Starting point of every probe: everything failed until a step says otherwise
    pub fn pending(url: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            identity: EnvironmentIdentity::from_url(url),
            url: url.to_string(),
            login_page: LoginPageStatus::NotLive,
            authorization: CheckStatus::Fail,
            message: CheckStatus::Fail,
            query_time_secs: 0,
            version: UNKNOWN_VERSION.to_string(),
            last_transaction_text: "Error retrieving data".to_string(),
            checked_at,
        }
    }

    /// Result for an excluded URL
    pub fn disabled(url: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            login_page: LoginPageStatus::Disabled,
            authorization: CheckStatus::Disabled,
            message: CheckStatus::Disabled,
            last_transaction_text: "Environment excluded from testing".to_string(),
            ..Self::pending(url, checked_at)
        }
    }

    /// Result carrying an `Error: ` sentinel, used when a probe did not finish
    pub fn failed(url: &str, error: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            last_transaction_text: format!("Error: {error}"),
            ..Self::pending(url, checked_at)
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.login_page == LoginPageStatus::Disabled
            && self.authorization == CheckStatus::Disabled
            && self.message == CheckStatus::Disabled
    }

    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }

    pub fn cluster(&self) -> &str {
        &self.identity.cluster
    }
}

/// Aggregate counts over one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub live: usize,
    pub authorized: usize,
    pub successful_queries: usize,
    pub disabled: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        Self {
            total: results.len(),
            live: results
                .iter()
                .filter(|r| r.login_page == LoginPageStatus::Live)
                .count(),
            authorized: results
                .iter()
                .filter(|r| r.authorization == CheckStatus::Success)
                .count(),
            successful_queries: results
                .iter()
                .filter(|r| r.message == CheckStatus::Success)
                .count(),
            disabled: results
                .iter()
                .filter(|r| r.login_page == LoginPageStatus::Disabled)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_result() {
        let result = ProbeResult::disabled("https://ns1.clusterA.example.net", Utc::now());
        assert!(result.is_disabled());
        assert_eq!(result.namespace(), "ns1");
        assert_eq!(result.version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_failed_result_sentinel() {
        let result = ProbeResult::failed("https://ns1.clusterA.example.net", "boom", Utc::now());
        assert_eq!(result.last_transaction_text, "Error: boom");
        assert_eq!(result.login_page, LoginPageStatus::NotLive);
        assert!(!result.is_disabled());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&LoginPageStatus::NotLive).unwrap();
        assert_eq!(json, "\"Not Live\"");
        let json = serde_json::to_string(&CheckStatus::Disabled).unwrap();
        assert_eq!(json, "\"Disabled\"");
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = ProbeResult::pending("https://ns1.clusterA.example.net", Utc::now());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["namespace"], "ns1");
        assert_eq!(value["cluster"], "clusterA");
        assert_eq!(value["region"], "N/A");
        assert_eq!(value["login_page"], "Not Live");
    }

    #[test]
    fn test_batch_summary() {
        let now = Utc::now();
        let mut live = ProbeResult::pending("https://a.b.net", now);
        live.login_page = LoginPageStatus::Live;
        live.authorization = CheckStatus::Success;
        let results = vec![
            live,
            ProbeResult::disabled("https://c.d.net", now),
            ProbeResult::pending("https://e.f.net", now),
        ];

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.live, 1);
        assert_eq!(summary.authorized, 1);
        assert_eq!(summary.successful_queries, 0);
        assert_eq!(summary.disabled, 1);
    }
}
