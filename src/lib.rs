pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod services;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{Monitor, MonitorHandle};
pub use domain::{AlertIntent, AlertKind, AlertState, EnvironmentIdentity, ProbeResult, ProbeTarget};
pub use error::{FleetError, ProbeError, Result};
pub use services::{BatchOrchestrator, EnvironmentProbe, TelemetryDispatcher};
pub use supervisor::{AlertChannel, AlertEngine};
