//! Alerting supervisor
//!
//! - Alert engine: failure hysteresis, reminders and recovery
//! - Channels: Slack and email delivery behind one trait

pub mod alert_engine;
pub mod channels;

pub use alert_engine::{AlertEngine, AlertOutcome, ConnectionStatus, Delivery};
pub use channels::{channels_from_config, AlertChannel};
