//! Error types for the replay-trader system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the replay-trader system.
#[derive(Error, Debug)]
pub enum Error {
    /// Entity construction rejected invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Market data error (malformed bar or symbol).
    #[error("Market data error: {0}")]
    MarketData(String),

    /// Order execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a market data error.
    pub fn market_data(msg: impl Into<String>) -> Self {
        Error::MarketData(msg.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Error::Execution(msg.into())
    }
}
