//! Configuration management
//!
//! Everything is environment-driven with sensible defaults; `from_env()`
//! reads `.env` via dotenvy and `validate()` rejects unusable values up
//! front.

use serde::{Deserialize, Serialize};

use crate::pipeline::{ConvertConfig, MonitorConfig};
use crate::storage::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default bucket for staged record streams.
pub const DEFAULT_STAGING_BUCKET: &str = "geoload-staging";

/// Which backend implementations to wire up at startup
///
/// Decided once when the orchestrator is built, never re-evaluated per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory object store and warehouse
    #[default]
    Simulated,
    /// S3 object store and BigQuery-style warehouse
    Real,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" | "memory" => Ok(BackendKind::Simulated),
            "real" | "production" => Ok(BackendKind::Real),
            _ => Err(anyhow::anyhow!("Invalid backend kind: {}", s)),
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Backend selection (simulated or real collaborators)
    pub backend: BackendKind,
    /// Default bucket for staged objects
    pub staging_bucket: String,
    /// External conversion utility settings
    pub convert: ConvertConfig,
    /// Load-job polling settings
    pub monitor: MonitorConfig,
    /// Object storage settings (used by the real backend)
    pub storage: StorageConfig,
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `GEOLOAD_BACKEND`: `simulated` or `real`
    /// - `GEOLOAD_STAGING_BUCKET`: default staging bucket
    /// - `GEOLOAD_OGR2OGR_PATH`: conversion utility binary
    /// - `GEOLOAD_POLL_INTERVAL_SECS`: seconds between status polls
    /// - `GEOLOAD_POLL_RETRY_BACKOFF_SECS`: backoff after a transient poll error
    /// - `GEOLOAD_MAX_POLL_ATTEMPTS`: polling attempt budget
    /// - `S3_*`: see [`StorageConfig::from_env`]
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut monitor = MonitorConfig::default();
        if let Some(interval) = parse_env("GEOLOAD_POLL_INTERVAL_SECS") {
            monitor.poll_interval_secs = interval;
        }
        if let Some(backoff) = parse_env("GEOLOAD_POLL_RETRY_BACKOFF_SECS") {
            monitor.retry_backoff_secs = backoff;
        }
        if let Some(attempts) = parse_env("GEOLOAD_MAX_POLL_ATTEMPTS") {
            monitor.max_attempts = attempts;
        }

        let mut convert = ConvertConfig::default();
        if let Ok(path) = std::env::var("GEOLOAD_OGR2OGR_PATH") {
            convert.ogr2ogr_path = path;
        }

        let config = Self {
            backend: std::env::var("GEOLOAD_BACKEND")
                .ok()
                .map(|s| s.parse::<BackendKind>())
                .transpose()?
                .unwrap_or_default(),
            staging_bucket: std::env::var("GEOLOAD_STAGING_BUCKET")
                .unwrap_or_else(|_| DEFAULT_STAGING_BUCKET.to_string()),
            convert,
            monitor,
            storage: StorageConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.staging_bucket.is_empty() {
            anyhow::bail!("GEOLOAD_STAGING_BUCKET cannot be empty");
        }
        if self.convert.ogr2ogr_path.is_empty() {
            anyhow::bail!("GEOLOAD_OGR2OGR_PATH cannot be empty");
        }
        if self.monitor.poll_interval_secs == 0 {
            anyhow::bail!("GEOLOAD_POLL_INTERVAL_SECS must be greater than 0");
        }
        if self.monitor.max_attempts == 0 {
            anyhow::bail!("GEOLOAD_MAX_POLL_ATTEMPTS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Simulated,
            staging_bucket: DEFAULT_STAGING_BUCKET.to_string(),
            convert: ConvertConfig::default(),
            monitor: MonitorConfig::default(),
            storage: StorageConfig {
                endpoint: None,
                region: "us-east-1".to_string(),
                access_key: String::new(),
                secret_key: String::new(),
                path_style: false,
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
