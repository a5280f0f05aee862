//! Error types for Budget Guard
//!
//! Only configuration and startup failures travel through [`Error`]. Runtime
//! failures inside a poll cycle use the per-interface error enums
//! ([`FetchError`](crate::billing::FetchError),
//! [`BackendError`](crate::mitigation::BackendError)) and are reported, never
//! propagated out of the loop.

use thiserror::Error;

/// Result type alias using Budget Guard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Budget Guard operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error while talking to an external service outside a poll cycle
    #[error("{service} error: {message}")]
    External {
        /// Service that failed
        service: String,
        /// Failure description
        message: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an error for a failed call to an external service
    pub fn external(service: impl Into<String>, message: impl ToString) -> Self {
        Self::External {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error stems from configuration and must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
