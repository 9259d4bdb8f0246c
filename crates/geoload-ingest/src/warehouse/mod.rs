//! Warehouse collaborator
//!
//! The analytical warehouse ingests staged NDJSON objects through
//! asynchronous load jobs. The pipeline needs four operations from it:
//! idempotent dataset/table creation, load-job submission, and load-job
//! status lookup. [`Warehouse`] is that interface; `bigquery` talks to a
//! BigQuery-style REST API, `memory` is the simulated backend with
//! scriptable status sequences. Selection happens once at startup.

use async_trait::async_trait;
use geoload_common::{SchemaField, TableDestination};
use serde::{Deserialize, Serialize};

pub mod bigquery;
pub mod memory;

pub use bigquery::BigQueryWarehouse;
pub use memory::MemoryWarehouse;

/// Result type for warehouse operations
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Error types for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Warehouse API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid warehouse response: {0}")]
    InvalidResponse(String),
}

/// Lifecycle state of a warehouse load job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadJobState {
    Pending,
    Running,
    Done,
}

impl LoadJobState {
    pub fn as_str(&self) -> &str {
        match self {
            LoadJobState::Pending => "PENDING",
            LoadJobState::Running => "RUNNING",
            LoadJobState::Done => "DONE",
        }
    }
}

/// One error entry reported by the warehouse for a load job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadJobError {
    pub reason: Option<String>,
    pub message: String,
}

/// Row/byte counters reported for a finished load
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadStats {
    pub output_rows: Option<u64>,
    pub output_bytes: Option<u64>,
}

/// Snapshot of a warehouse load job's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadJobStatus {
    pub state: LoadJobState,
    pub errors: Vec<LoadJobError>,
    pub statistics: Option<LoadStats>,
}

impl LoadJobStatus {
    pub fn pending() -> Self {
        Self {
            state: LoadJobState::Pending,
            errors: Vec::new(),
            statistics: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: LoadJobState::Running,
            errors: Vec::new(),
            statistics: None,
        }
    }

    pub fn done(statistics: Option<LoadStats>) -> Self {
        Self {
            state: LoadJobState::Done,
            errors: Vec::new(),
            statistics,
        }
    }

    pub fn done_with_errors(messages: Vec<String>) -> Self {
        Self {
            state: LoadJobState::Done,
            errors: messages
                .into_iter()
                .map(|message| LoadJobError {
                    reason: None,
                    message,
                })
                .collect(),
            statistics: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == LoadJobState::Done
    }
}

/// Warehouse interface used by the pipeline
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the dataset if it does not exist; "already exists" is success
    async fn ensure_dataset(&self, project_id: &str, dataset_id: &str) -> Result<()>;

    /// Create the table if it does not exist; "already exists" is success
    async fn ensure_table(
        &self,
        destination: &TableDestination,
        schema: &[SchemaField],
    ) -> Result<()>;

    /// Submit an asynchronous load of a staged object into a table
    ///
    /// Without a schema the load is submitted in auto-detect mode.
    async fn submit_load_job(
        &self,
        source_uri: &str,
        destination: &TableDestination,
        schema: Option<&[SchemaField]>,
    ) -> Result<String>;

    /// Fetch the current status of a previously submitted load job
    async fn get_job_status(&self, project_id: &str, job_id: &str) -> Result<LoadJobStatus>;
}
