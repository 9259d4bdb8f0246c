//! Job data model

use chrono::{DateTime, Utc};
use geoload_common::{SchemaField, TableDestination};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::pipeline::{GeometryEncoding, PipelineError, Result};

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Converting,
    Encoding,
    Staging,
    Loading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::Converting => "converting",
            JobStatus::Encoding => "encoding",
            JobStatus::Staging => "staging",
            JobStatus::Loading => "loading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Severity of a job log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobLogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in a job's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub timestamp: DateTime<Utc>,
    pub level: JobLogLevel,
    pub message: String,
}

/// Where the source dataset came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSource {
    Local { file_name: String, size: u64 },
    Remote { bucket: String, path: String },
}

impl JobSource {
    /// Name of the source file, for staging paths and input dispatch
    pub fn file_name(&self) -> &str {
        match self {
            JobSource::Local { file_name, .. } => file_name,
            JobSource::Remote { path, .. } => path.rsplit('/').next().unwrap_or(path),
        }
    }
}

/// Input format, dispatched from the source file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Zip archive of shapefile components
    ShapefileArchive,
    /// GeoJSON / plain JSON document
    Json,
    /// Comma-separated values
    Csv,
}

impl InputKind {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(InputKind::ShapefileArchive)
        } else if lower.ends_with(".json") || lower.ends_with(".geojson") {
            Some(InputKind::Json)
        } else if lower.ends_with(".csv") {
            Some(InputKind::Csv)
        } else {
            None
        }
    }
}

/// The unit of work tracked end-to-end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: String,
    pub status: JobStatus,
    /// 0-100, monotonically non-decreasing on the successful path
    pub progress: u8,
    pub source: JobSource,
    pub destination: TableDestination,
    pub schema: Option<Vec<SchemaField>>,
    /// Warehouse-side load job id, once submission succeeded
    pub external_load_job_id: Option<String>,
    pub record_count: Option<u64>,
    pub staged_uri: Option<String>,
    pub logs: Vec<JobLog>,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Set exactly when the job reaches a terminal status
    pub end_time: Option<DateTime<Utc>>,
    /// Set exactly when the job fails
    pub error_message: Option<String>,
}

/// Aggregate counters over all tracked jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
}

/// Source dataset handed over at submission time
#[derive(Debug, Clone)]
pub enum SubmitSource {
    /// Bytes uploaded by the caller
    Local { file_name: String, bytes: Vec<u8> },
    /// Dataset already resident in object storage
    Remote { bucket: String, path: String },
}

impl SubmitSource {
    pub fn file_name(&self) -> &str {
        match self {
            SubmitSource::Local { file_name, .. } => file_name,
            SubmitSource::Remote { path, .. } => path.rsplit('/').next().unwrap_or(path),
        }
    }
}

/// Submission payload for a new job
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub source: SubmitSource,
    pub project_id: String,
    /// Destination in `"dataset.table"` form
    pub target_table: String,
    /// Explicit schema; inferred from the records when absent
    pub schema: Option<Vec<SchemaField>>,
    /// Staging bucket override; the configured default applies when absent
    pub staging_bucket: Option<String>,
    /// Comma-separated column names forced to INTEGER during inference
    pub integer_columns: Option<String>,
    pub geometry_encoding: GeometryEncoding,
}

impl JobConfig {
    pub fn new(
        source: SubmitSource,
        project_id: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            source,
            project_id: project_id.into(),
            target_table: target_table.into(),
            schema: None,
            staging_bucket: None,
            integer_columns: None,
            geometry_encoding: GeometryEncoding::default(),
        }
    }

    pub fn with_schema(mut self, schema: Vec<SchemaField>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_geometry_encoding(mut self, encoding: GeometryEncoding) -> Self {
        self.geometry_encoding = encoding;
        self
    }

    /// Validate the submission and resolve the table destination
    ///
    /// Runs synchronously at creation time so a bad configuration rejects
    /// job creation outright instead of producing a job that immediately
    /// fails.
    pub fn validate(&self) -> Result<TableDestination> {
        if self.project_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Project ID is required".to_string(),
            ));
        }

        match &self.source {
            SubmitSource::Local { file_name, bytes } => {
                if file_name.trim().is_empty() {
                    return Err(PipelineError::Validation(
                        "File name is required for local file processing".to_string(),
                    ));
                }
                if bytes.is_empty() {
                    return Err(PipelineError::Validation(
                        "Uploaded file is empty".to_string(),
                    ));
                }
            },
            SubmitSource::Remote { bucket, path } => {
                if bucket.trim().is_empty() {
                    return Err(PipelineError::Validation(
                        "Bucket is required for a remote source".to_string(),
                    ));
                }
                if path.trim().is_empty() {
                    return Err(PipelineError::Validation(
                        "Object path is required for a remote source".to_string(),
                    ));
                }
            },
        }

        if InputKind::from_file_name(self.source.file_name()).is_none() {
            return Err(PipelineError::Validation(format!(
                "Unsupported file type: {}",
                self.source.file_name()
            )));
        }

        if let Some(schema) = &self.schema {
            let mut names = HashSet::new();
            for field in schema {
                if !names.insert(field.name.as_str()) {
                    return Err(PipelineError::Validation(format!(
                        "Duplicate schema field: {}",
                        field.name
                    )));
                }
            }
        }

        parse_target_table(&self.project_id, &self.target_table)
    }

    /// Integer-column overrides as a list of trimmed names
    pub fn integer_column_list(&self) -> Vec<String> {
        self.integer_columns
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

/// Parse a `"dataset.table"` string into a full destination
pub fn parse_target_table(project_id: &str, target_table: &str) -> Result<TableDestination> {
    let mut parts = target_table.splitn(2, '.');
    let dataset_id = parts.next().unwrap_or("");
    let table_id = parts.next().unwrap_or("");

    if dataset_id.is_empty() || table_id.is_empty() {
        return Err(PipelineError::Validation(
            "Target table must be in format: dataset.table".to_string(),
        ));
    }

    Ok(TableDestination::new(project_id, dataset_id, table_id))
}
