//! Outbound integrations: tenant HTTP API, Slack, SMTP email, Groundcover

pub mod email;
pub mod groundcover;
pub mod slack;
pub mod tenant;

pub use email::EmailNotifier;
pub use groundcover::GroundcoverSink;
pub use slack::SlackNotifier;
pub use tenant::{QueryOutcome, Session, TenantClient};
