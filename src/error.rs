use thiserror::Error;

/// Main error type for fleetwatch
#[derive(Error, Debug)]
pub enum FleetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Email errors
    #[error("Email error: {0}")]
    Email(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

impl From<lettre::error::Error> for FleetError {
    fn from(err: lettre::error::Error) -> Self {
        FleetError::Email(err.to_string())
    }
}

impl From<lettre::address::AddressError> for FleetError {
    fn from(err: lettre::address::AddressError) -> Self {
        FleetError::Email(format!("invalid address: {err}"))
    }
}

impl From<lettre::transport::smtp::Error> for FleetError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        FleetError::Email(err.to_string())
    }
}

/// Failures that end a probe before its query step.
///
/// The `Display` text is what follows the `Error: ` sentinel in a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("No application ID configured for this environment")]
    MissingApplicationId,

    #[error("Login timeout")]
    LoginTimeout,

    #[error("HTTP {status}: {body}")]
    LoginRejected { status: u16, body: String },

    #[error("All login attempts failed")]
    LoginExhausted,

    #[error("{0}")]
    Unexpected(String),
}
