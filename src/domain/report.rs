use super::alert::AlertState;
use super::probe_result::{BatchSummary, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource figures for one cluster, as supplied by the metrics source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetric {
    pub cluster: String,
    pub region: String,
    pub nodes: u32,
    pub ram_usage: f64,
    pub cpu_usage: f64,
}

/// Error counts for one namespace, as supplied by the metrics source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDistribution {
    pub namespace: String,
    pub cluster: String,
    pub errors_24h: u64,
    pub error_rate_24h: f64,
}

/// Everything a daily report renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ProbeResult>,
    pub ongoing_alerts: usize,
    #[serde(default)]
    pub cluster_metrics: Vec<ClusterMetric>,
    #[serde(default)]
    pub error_distributions: Vec<ErrorDistribution>,
}

impl ReportSnapshot {
    pub fn new(results: Vec<ProbeResult>, state: &AlertState, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            results,
            ongoing_alerts: state.ongoing().count(),
            cluster_metrics: Vec::new(),
            error_distributions: Vec::new(),
        }
    }

    pub fn with_metrics(
        mut self,
        cluster_metrics: Vec<ClusterMetric>,
        error_distributions: Vec<ErrorDistribution>,
    ) -> Self {
        self.cluster_metrics = cluster_metrics;
        self.error_distributions = error_distributions;
        self
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }

    pub fn total_nodes(&self) -> u32 {
        self.cluster_metrics.iter().map(|m| m.nodes).sum()
    }

    pub fn highest_error_rate(&self) -> f64 {
        self.error_distributions
            .iter()
            .map(|e| e.error_rate_24h)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoginPageStatus;

    #[test]
    fn test_report_figures() {
        let now = Utc::now();
        let mut live = ProbeResult::pending("https://a.b.net", now);
        live.login_page = LoginPageStatus::Live;
        let report = ReportSnapshot::new(
            vec![live, ProbeResult::pending("https://c.d.net", now)],
            &AlertState::new(),
            now,
        )
        .with_metrics(
            vec![
                ClusterMetric {
                    cluster: "b".into(),
                    region: "N/A".into(),
                    nodes: 3,
                    ram_usage: 40.0,
                    cpu_usage: 20.0,
                },
                ClusterMetric {
                    cluster: "d".into(),
                    region: "N/A".into(),
                    nodes: 5,
                    ram_usage: 60.0,
                    cpu_usage: 30.0,
                },
            ],
            vec![ErrorDistribution {
                namespace: "a".into(),
                cluster: "b".into(),
                errors_24h: 12,
                error_rate_24h: 2.5,
            }],
        );

        assert_eq!(report.summary().live, 1);
        assert_eq!(report.total_nodes(), 8);
        assert!((report.highest_error_rate() - 2.5).abs() < f64::EPSILON);
        assert_eq!(report.ongoing_alerts, 0);
    }
}
