use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNKNOWN_NAMESPACE: &str = "unknown_env";
pub const UNKNOWN_CLUSTER: &str = "unknown_cluster";

/// Region classification, derived from a substring of the cluster label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "US-EAST")]
    UsEast,
    #[serde(rename = "DEV")]
    Dev,
    #[serde(rename = "MERCURY")]
    Mercury,
    #[serde(rename = "N/A")]
    Unknown,
}

/// Checked in order; the first matching substring wins.
const REGION_TABLE: &[(&str, Region)] = &[
    ("erag-c1", Region::Us),
    ("euc1", Region::Eu),
    ("use1", Region::UsEast),
    ("erag-dev", Region::Dev),
    ("mercury", Region::Mercury),
];

impl Region {
    pub fn classify(cluster: &str) -> Self {
        REGION_TABLE
            .iter()
            .find(|(needle, _)| cluster.contains(needle))
            .map(|(_, region)| *region)
            .unwrap_or(Region::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Eu => "EU",
            Region::UsEast => "US-EAST",
            Region::Dev => "DEV",
            Region::Mercury => "MERCURY",
            Region::Unknown => "N/A",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who an environment URL belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentIdentity {
    pub namespace: String,
    pub cluster: String,
    pub region: Region,
}

impl EnvironmentIdentity {
    /// Derive the identity of an environment from its URL.
    ///
    /// Never fails: labels that cannot be found fall back to
    /// `unknown_env` / `unknown_cluster`.
    pub fn from_url(url: &str) -> Self {
        let host = host_of(url);
        let mut labels = host.split('.');

        let namespace = labels
            .next()
            .filter(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_NAMESPACE)
            .to_string();
        let cluster = labels
            .next()
            .filter(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_CLUSTER)
            .to_string();
        let region = Region::classify(&cluster);

        Self {
            namespace,
            cluster,
            region,
        }
    }

    /// Alert state key: `namespace-cluster`
    pub fn key(&self) -> String {
        format!("{}-{}", self.namespace, self.cluster)
    }
}

fn host_of(url: &str) -> &str {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = without_scheme
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    // Drop userinfo and port; labels keep their original case.
    let host = authority.rsplit('@').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default()
}
