//! Error kinds shared by every procflow component.
//!
//! Per-case logical anomalies (an illegal directly-follows pair, an
//! unexpected delay) are measured, never raised. Only the four kinds below
//! travel through a stream.

use thiserror::Error;

/// Result alias used across procflow.
pub type Result<T> = std::result::Result<T, MiningError>;

/// Discriminant of a [`MiningError`], convenient for matching and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Input,
    Config,
    Protocol,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Config => "config",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Io => "io",
        }
    }
}

/// Errors surfaced by miners, estimators, checkers and sources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MiningError {
    /// Malformed or incomplete event: a missing required field, or an
    /// object-centric event that is not flattened to a single object.
    #[error("Input error: {0}")]
    Input(String),

    /// Invalid parameter supplied when constructing a component.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A message of unknown shape reached a consumer. Recoverable.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Upstream source failure. Terminates the pipeline.
    #[error("I/O error: {0}")]
    Io(String),
}

impl MiningError {
    pub fn input(msg: impl Into<String>) -> Self {
        MiningError::Input(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        MiningError::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        MiningError::Protocol(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        MiningError::Io(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MiningError::Input(_) => ErrorKind::Input,
            MiningError::Config(_) => ErrorKind::Config,
            MiningError::Protocol(_) => ErrorKind::Protocol,
            MiningError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a consumer may log and skip this error instead of terminating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MiningError::Protocol(_))
    }
}

impl From<std::io::Error> for MiningError {
    fn from(e: std::io::Error) -> Self {
        MiningError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MiningError {
    fn from(e: serde_json::Error) -> Self {
        MiningError::Input(e.to_string())
    }
}

/// Validate a lossy-counting error bound `ε ∈ (0, 1)`.
pub fn check_epsilon(name: &str, epsilon: f64) -> Result<f64> {
    if epsilon.is_finite() && epsilon > 0.0 && epsilon < 1.0 {
        Ok(epsilon)
    } else {
        Err(MiningError::config(format!(
            "{} must lie in (0, 1), got {}",
            name, epsilon
        )))
    }
}

/// Validate a threshold in `[0, 1]`.
pub fn check_unit_interval(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(MiningError::config(format!(
            "{} must lie in [0, 1], got {}",
            name, value
        )))
    }
}
