//! Job processing pipeline
//!
//! The stages a dataset moves through on its way into the warehouse:
//!
//! - **extract**: Unpack an uploaded archive, locate the primary geometry file
//! - **convert**: Normalize the primary file to a GeoJSON feature collection
//! - **encode**: Flatten features into newline-delimited JSON records
//! - **schema**: Infer a column-typed schema from the record stream
//! - **stage**: Write the record stream to object storage
//! - **load**: Submit the warehouse load job
//! - **monitor**: Poll the load job to a terminal outcome
//!
//! Stages run strictly sequentially within one job; each stage's output is
//! the next stage's only input. Any fatal error short-circuits the rest.

pub mod convert;
pub mod encode;
pub mod extract;
pub mod geojson;
pub mod load;
pub mod monitor;
pub mod schema;
pub mod stage;

pub use convert::{convert_to_feature_collection, ConvertConfig};
pub use encode::{
    encode_features, parse_csv_records, parse_json_records, to_ndjson, GeometryEncoding, Record,
};
pub use extract::{extract_archive, ExtractedArchive, ExtractedFile};
pub use geojson::{Feature, FeatureCollection, Geometry};
pub use load::submit_load;
pub use monitor::{monitor_load_job, MonitorConfig, MonitorOutcome};
pub use schema::{infer_schema, SchemaInference};
pub use stage::{stage_records, staging_key};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for the job processing pipeline
///
/// Every variant surfaces as the terminal `error_message` of a failed job;
/// none are silently swallowed. Only transient polling errors inside the
/// monitor are retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("No {extension} file found in the archive")]
    MissingPrimaryFile { extension: String },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Load submission error: {0}")]
    LoadSubmission(String),

    #[error("Warehouse load job failed: {0}")]
    WarehouseJobFailed(String),

    #[error("{0}")]
    MonitoringTimeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] geoload_common::GeoloadError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] crate::warehouse::WarehouseError),
}
