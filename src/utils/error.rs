use thiserror::Error;

use crate::model::ModelError;
use crate::storage::StoreError;

/// Custom error types for the attack comparison service
#[derive(Error, Debug)]
pub enum CompareError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Counter table related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Language model API related errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Metrics recorder could not be installed
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for attack comparison service operations
pub type CompareResult<T> = Result<T, CompareError>;

impl From<std::io::Error> for CompareError {
    fn from(err: std::io::Error) -> Self {
        CompareError::Internal(err.to_string())
    }
}

impl From<metrics_exporter_prometheus::BuildError> for CompareError {
    fn from(err: metrics_exporter_prometheus::BuildError) -> Self {
        CompareError::Metrics(err.to_string())
    }
}
