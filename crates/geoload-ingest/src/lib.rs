//! Geoload Ingest Library
//!
//! Converts user-supplied geospatial vector datasets (shapefile archives,
//! GeoJSON/JSON documents, CSV files) into schema-typed newline-delimited
//! JSON, stages the result in object storage, and drives an asynchronous
//! warehouse load job to completion. Every submission is tracked end-to-end
//! as an observable [`jobs::Job`].
//!
//! # Architecture
//!
//! - **config**: Environment-driven configuration (GEOLOAD_* variables)
//! - **auth**: Identity collaborator (bearer credential + scopes)
//! - **storage**: Object storage collaborator (S3 or in-memory)
//! - **warehouse**: Warehouse collaborator (BigQuery-style REST or in-memory)
//! - **pipeline**: Extract, convert, encode, infer, stage, load, monitor
//! - **jobs**: Job model, registry, and the orchestrator
//!
//! # Example
//!
//! ```no_run
//! use geoload_ingest::config::IngestConfig;
//! use geoload_ingest::jobs::{JobConfig, JobOrchestrator, SubmitSource};
//! use std::sync::Arc;
//!
//! # async fn run(tokens: Arc<dyn geoload_ingest::auth::TokenProvider>) -> anyhow::Result<()> {
//! let config = IngestConfig::from_env()?;
//! let orchestrator = JobOrchestrator::from_config(config, tokens)?;
//!
//! let job = orchestrator
//!     .create_job(
//!         JobConfig::new(
//!             SubmitSource::Local {
//!                 file_name: "parcels.zip".to_string(),
//!                 bytes: std::fs::read("parcels.zip")?,
//!             },
//!             "acme-gis",
//!             "geo.parcels",
//!         ),
//!         "user-1",
//!     )
//!     .await?;
//!
//! let mut updates = orchestrator.subscribe(job.id).expect("job exists");
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{:?} {}%", snapshot.status, snapshot.progress);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod jobs;
pub mod pipeline;
pub mod storage;
pub mod warehouse;

pub use config::IngestConfig;
pub use jobs::{Job, JobConfig, JobOrchestrator, JobStatus, SubmitSource};
pub use pipeline::PipelineError;
