//! Error types for geoload

use thiserror::Error;

/// Result type alias for geoload operations
pub type Result<T> = std::result::Result<T, GeoloadError>;

/// Main error type for geoload
#[derive(Error, Debug)]
pub enum GeoloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),
}
