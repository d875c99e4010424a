//! Error types for the chart hub

use thiserror::Error;

/// Hub-wide error type
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Bad input from the caller
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The vendor answered with something unusable
    #[error("Vendor error ({service}): {message}")]
    Vendor { service: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChartError {
    pub fn api(msg: impl Into<String>) -> Self {
        ChartError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ChartError::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ChartError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ChartError::NotFound(msg.into())
    }

    pub fn vendor(service: impl Into<String>, message: impl Into<String>) -> Self {
        ChartError::Vendor {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ChartError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ChartError::Internal(msg.into())
    }
}

/// Result type alias for hub operations
pub type ChartResult<T> = Result<T, ChartError>;
