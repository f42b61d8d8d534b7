//! Coordination layer
//!
//! Owns the long-lived monitoring loop and its stop handle.

pub mod monitor;

pub use monitor::{CycleReport, MetricsSource, Monitor, MonitorHandle, NoMetrics};
