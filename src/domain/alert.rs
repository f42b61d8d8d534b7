use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const RECOVERED_REASON: &str = "Environment recovered";

/// Recorded status of an environment in the alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Fail,
    Success,
}

/// Per-environment alert bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub status: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub namespace: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AlertRecord {
    /// Record for a freshly observed failure
    pub fn failing(namespace: &str, cluster: &str, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            status: AlertStatus::Fail,
            first_failure_at: Some(now),
            last_reminder_at: Some(now),
            namespace: namespace.to_string(),
            cluster: cluster.to_string(),
            reason: Some(reason),
        }
    }

    pub fn is_failing(&self) -> bool {
        self.status == AlertStatus::Fail
    }

    /// Reminder cadence anchor: last reminder, else first failure
    pub fn reminder_anchor(&self) -> Option<DateTime<Utc>> {
        self.last_reminder_at.or(self.first_failure_at)
    }
}

/// Alert state snapshot, keyed by `namespace-cluster`.
///
/// A key with no entry means healthy (or never tested). Presence does not
/// imply failure; check [`AlertRecord::is_failing`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertState {
    records: BTreeMap<String, AlertRecord>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AlertRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn insert(&mut self, key: String, record: AlertRecord) -> Option<AlertRecord> {
        self.records.insert(key, record)
    }

    pub fn remove(&mut self, key: &str) -> Option<AlertRecord> {
        self.records.remove(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AlertRecord)> {
        self.records.iter()
    }

    /// Records currently in FAIL
    pub fn ongoing(&self) -> impl Iterator<Item = (&String, &AlertRecord)> {
        self.records.iter().filter(|(_, record)| record.is_failing())
    }
}

impl FromIterator<(String, AlertRecord)> for AlertState {
    fn from_iter<T: IntoIterator<Item = (String, AlertRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Which transition an intent announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    New,
    Reminder,
    Resolved,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::New => "new",
            AlertKind::Reminder => "reminder",
            AlertKind::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decided notification, prior to channel delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertIntent {
    pub environment: String,
    pub cluster: String,
    pub reason: String,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

impl AlertIntent {
    pub fn new(
        environment: &str,
        cluster: &str,
        reason: &str,
        kind: AlertKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            environment: environment.to_string(),
            cluster: cluster.to_string(),
            reason: reason.to_string(),
            kind,
            timestamp,
        }
    }

    /// Reason as shown to humans; reminders are tagged
    pub fn display_reason(&self) -> String {
        match self.kind {
            AlertKind::Reminder => format!("[REMINDER] {}", self.reason),
            AlertKind::New | AlertKind::Resolved => self.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_absent_key_is_healthy() {
        let mut state = AlertState::new();
        assert!(state.get("ns1-clusterA").is_none());

        let now = Utc::now();
        state.insert(
            "ns1-clusterA".into(),
            AlertRecord::failing("ns1", "clusterA", "Login page: Not Live".into(), now),
        );
        assert!(state.contains_key("ns1-clusterA"));
        assert_eq!(state.ongoing().count(), 1);

        state.remove("ns1-clusterA");
        assert!(!state.contains_key("ns1-clusterA"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_reminder_anchor_falls_back_to_first_failure() {
        let t0 = Utc::now();
        let mut record = AlertRecord::failing("ns1", "clusterA", "x".into(), t0);
        record.last_reminder_at = None;
        assert_eq!(record.reminder_anchor(), Some(t0));

        record.last_reminder_at = Some(t0 + Duration::hours(2));
        assert_eq!(record.reminder_anchor(), Some(t0 + Duration::hours(2)));
    }

    #[test]
    fn test_state_json_shape() {
        let t0 = Utc::now();
        let state: AlertState = [(
            "ns1-clusterA".to_string(),
            AlertRecord::failing("ns1", "clusterA", "Message: Fail".into(), t0),
        )]
        .into_iter()
        .collect();

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["ns1-clusterA"]["status"], "FAIL");
        assert_eq!(value["ns1-clusterA"]["reason"], "Message: Fail");

        let back: AlertState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_reminder_display_reason() {
        let intent = AlertIntent::new("ns1", "clusterA", "Message: Fail", AlertKind::Reminder, Utc::now());
        assert_eq!(intent.display_reason(), "[REMINDER] Message: Fail");
        assert_eq!(intent.reason, "Message: Fail");
    }
}
