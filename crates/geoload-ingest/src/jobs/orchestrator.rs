//! Job orchestration
//!
//! Owns every Job for its entire life: creation, the staged processing
//! sequence, progress/log updates, subscriptions, and deletion. The
//! registry is an arena keyed by job id; all mutations for one job are
//! serialized through [`Inner::update_job`] behind that job's own mutex, so
//! concurrent jobs never contend on a process-wide lock and log appends are
//! never lost or reordered.
//!
//! Jobs run as independent tokio tasks. Stages execute strictly
//! sequentially within one job; the first fatal error short-circuits the
//! rest and the job transitions to `failed`. No stage is retried here — a
//! failed job is resubmitted as a new job, because intermediate artifacts
//! (extraction dirs, partial uploads) do not survive job boundaries.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use geoload_common::TableDestination;

use super::models::{
    InputKind, Job, JobConfig, JobLog, JobLogLevel, JobSource, JobStats, JobStatus, SubmitSource,
};
use crate::auth::TokenProvider;
use crate::config::{BackendKind, IngestConfig};
use crate::pipeline::{
    convert_to_feature_collection, encode_features, extract_archive, infer_schema, monitor_load_job,
    parse_csv_records, parse_json_records, stage_records, submit_load, to_ndjson, MonitorOutcome,
    PipelineError, Record, Result,
};
use crate::storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use crate::warehouse::{BigQueryWarehouse, LoadJobStatus, MemoryWarehouse, Warehouse};

// Progress checkpoints at stage boundaries; monotonically non-decreasing.
const PROGRESS_EXTRACTING: u8 = 10;
const PROGRESS_CONVERTING: u8 = 20;
const PROGRESS_ENCODING: u8 = 50;
const PROGRESS_STAGING: u8 = 70;
const PROGRESS_LOADING: u8 = 90;

/// One tracked job behind its own serialization point
struct JobHandle {
    state: Mutex<Job>,
    updates: watch::Sender<Job>,
    cancel: CancellationToken,
}

/// Owner and single writer of all Job records
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: IngestConfig,
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
}

impl JobOrchestrator {
    /// Create an orchestrator over explicit collaborators
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                warehouse,
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Wire up collaborators per the configured backend kind
    ///
    /// The selection happens exactly once, here; nothing downstream ever
    /// re-evaluates it.
    pub fn from_config(
        config: IngestConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> anyhow::Result<Self> {
        let (store, warehouse): (Arc<dyn ObjectStore>, Arc<dyn Warehouse>) = match config.backend {
            BackendKind::Simulated => {
                info!("Using simulated object store and warehouse");
                (
                    Arc::new(MemoryObjectStore::new()),
                    Arc::new(MemoryWarehouse::new()),
                )
            },
            BackendKind::Real => {
                info!("Using S3 object store and warehouse REST API");
                (
                    Arc::new(S3ObjectStore::new(config.storage.clone())),
                    Arc::new(BigQueryWarehouse::new(tokens)?),
                )
            },
        };

        Ok(Self::new(config, store, warehouse))
    }

    /// Validate a submission, register the job, and start processing it
    ///
    /// Validation failures reject creation outright; no job record is
    /// produced for a bad configuration.
    pub async fn create_job(&self, config: JobConfig, owner_id: &str) -> Result<Job> {
        let destination = config.validate()?;
        let input_kind = InputKind::from_file_name(config.source.file_name()).ok_or_else(|| {
            PipelineError::Validation(format!(
                "Unsupported file type: {}",
                config.source.file_name()
            ))
        })?;

        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let source = match &config.source {
            SubmitSource::Local { file_name, bytes } => JobSource::Local {
                file_name: file_name.clone(),
                size: bytes.len() as u64,
            },
            SubmitSource::Remote { bucket, path } => JobSource::Remote {
                bucket: bucket.clone(),
                path: path.clone(),
            },
        };

        let job = Job {
            id: job_id,
            owner_id: owner_id.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            source,
            destination: destination.clone(),
            schema: config.schema.clone(),
            external_load_job_id: None,
            record_count: None,
            staged_uri: None,
            logs: Vec::new(),
            start_time: now,
            last_updated: now,
            end_time: None,
            error_message: None,
        };

        let (updates, _) = watch::channel(job.clone());
        let handle = Arc::new(JobHandle {
            state: Mutex::new(job.clone()),
            updates,
            cancel: CancellationToken::new(),
        });

        self.inner
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, handle);

        self.inner.append_log(
            job_id,
            JobLogLevel::Info,
            format!("Job created for: {}", config.source.file_name()),
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner
                .process_job(job_id, config, destination, input_kind)
                .await
            {
                error!(job_id = %job_id, error = %e, "Job processing failed");
                inner.fail_job(job_id, e.to_string());
            }
        });

        Ok(self.get_job(job_id).unwrap_or(job))
    }

    /// Read-only snapshot of one job
    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.handle(job_id).map(|handle| handle.snapshot())
    }

    /// Read-only snapshots of an owner's jobs, newest first
    pub fn get_jobs(&self, owner_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .handles()
            .into_iter()
            .map(|handle| handle.snapshot())
            .filter(|job| job.owner_id == owner_id)
            .collect();
        jobs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        jobs
    }

    /// Subscribe to a job's state changes
    ///
    /// The receiver always holds the latest snapshot; dropping it
    /// unsubscribes.
    pub fn subscribe(&self, job_id: Uuid) -> Option<watch::Receiver<Job>> {
        self.inner
            .handle(job_id)
            .map(|handle| handle.updates.subscribe())
    }

    /// Administrative removal of a job
    ///
    /// Cancels in-flight processing cooperatively: outstanding monitor
    /// polls stop scheduling further attempts instead of firing into a
    /// removed record.
    pub fn delete_job(&self, job_id: Uuid) -> bool {
        let removed = self
            .inner
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job_id);

        match removed {
            Some(handle) => {
                handle.cancel.cancel();
                info!(job_id = %job_id, "Job deleted");
                true
            },
            None => false,
        }
    }

    /// Aggregate counters over all tracked jobs
    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for handle in self.inner.handles() {
            let job = handle.snapshot();
            stats.total += 1;
            match job.status {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                _ => stats.in_progress += 1,
            }
        }
        stats
    }

    /// Manual status lookup for a job's warehouse load job
    ///
    /// For loads that outlive the monitor's polling budget, this asks the
    /// warehouse directly instead of re-running the pipeline.
    pub async fn lookup_load_job(&self, job_id: Uuid) -> Result<LoadJobStatus> {
        let job = self
            .get_job(job_id)
            .ok_or_else(|| PipelineError::Validation(format!("Unknown job: {}", job_id)))?;

        let external_id = job.external_load_job_id.ok_or_else(|| {
            PipelineError::Validation("Job has no warehouse load job yet".to_string())
        })?;

        let status = self
            .inner
            .warehouse
            .get_job_status(&job.destination.project_id, &external_id)
            .await?;

        Ok(status)
    }
}

impl JobHandle {
    fn snapshot(&self) -> Job {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Inner {
    fn handle(&self, job_id: Uuid) -> Option<Arc<JobHandle>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }

    fn handles(&self) -> Vec<Arc<JobHandle>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// The single mutation path for a job record
    ///
    /// Returns the post-mutation snapshot, or `None` when the job has been
    /// deleted (late callers simply stop).
    fn update_job(&self, job_id: Uuid, mutate: impl FnOnce(&mut Job)) -> Option<Job> {
        let handle = self.handle(job_id)?;
        let mut job = handle.state.lock().unwrap_or_else(|e| e.into_inner());
        mutate(&mut job);
        job.last_updated = Utc::now();
        let snapshot = job.clone();
        drop(job);

        handle.updates.send_replace(snapshot.clone());
        Some(snapshot)
    }

    /// Append to the job's log and mirror to the process log
    fn append_log(&self, job_id: Uuid, level: JobLogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            JobLogLevel::Info => info!(job_id = %job_id, "{}", message),
            JobLogLevel::Warn => warn!(job_id = %job_id, "{}", message),
            JobLogLevel::Error => error!(job_id = %job_id, "{}", message),
        }

        self.update_job(job_id, |job| {
            job.logs.push(JobLog {
                timestamp: Utc::now(),
                level,
                message: message.clone(),
            });
        });
    }

    /// Advance status and progress; progress never decreases
    fn set_status(&self, job_id: Uuid, status: JobStatus, progress: u8) -> Option<Job> {
        let snapshot = self.update_job(job_id, |job| {
            job.status = status;
            job.progress = job.progress.max(progress);
        })?;
        self.append_log(
            job_id,
            JobLogLevel::Info,
            format!("Status updated: {} ({}%)", status.as_str(), snapshot.progress),
        );
        Some(snapshot)
    }

    fn complete_job(&self, job_id: Uuid) {
        self.update_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.end_time = Some(Utc::now());
        });
        self.append_log(job_id, JobLogLevel::Info, "Job completed successfully");
    }

    fn fail_job(&self, job_id: Uuid, message: String) {
        self.append_log(
            job_id,
            JobLogLevel::Error,
            format!("Job processing failed: {}", message),
        );
        self.update_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error_message = Some(message);
            job.end_time = Some(Utc::now());
        });
    }

    /// Whether processing should stop quietly (job deleted or cancelled)
    fn is_cancelled(&self, job_id: Uuid) -> bool {
        match self.handle(job_id) {
            Some(handle) => handle.cancel.is_cancelled(),
            None => true,
        }
    }

    /// Run one job through every pipeline stage
    async fn process_job(
        &self,
        job_id: Uuid,
        config: JobConfig,
        destination: TableDestination,
        input_kind: InputKind,
    ) -> Result<()> {
        self.append_log(job_id, JobLogLevel::Info, "Starting job processing");
        self.set_status(job_id, JobStatus::Extracting, PROGRESS_EXTRACTING);

        let bytes = match &config.source {
            SubmitSource::Local { bytes, .. } => {
                self.append_log(job_id, JobLogLevel::Info, "Using locally uploaded file");
                bytes.clone()
            },
            SubmitSource::Remote { bucket, path } => {
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    format!("Downloading source from {}/{}", bucket, path),
                );
                let data = self.store.download(bucket, path).await?;
                self.append_log(job_id, JobLogLevel::Info, "Source file downloaded");
                data
            },
        };

        if self.is_cancelled(job_id) {
            return Ok(());
        }

        let records = self
            .produce_records(job_id, &config, input_kind, &bytes)
            .await?;

        self.append_log(
            job_id,
            JobLogLevel::Info,
            format!("Encoded {} records", records.len()),
        );
        self.update_job(job_id, |job| job.record_count = Some(records.len() as u64));

        let schema = match &config.schema {
            Some(schema) => {
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    format!("Using caller-supplied schema ({} fields)", schema.len()),
                );
                Some(schema.clone())
            },
            None if records.is_empty() => {
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    "No records to sample; the warehouse will auto-detect the schema",
                );
                None
            },
            None => {
                let inferred = infer_schema(&records, &config.integer_column_list());
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    format!("Inferred schema with {} fields", inferred.len()),
                );
                Some(inferred)
            },
        };
        self.update_job(job_id, |job| job.schema = schema.clone());

        if self.is_cancelled(job_id) {
            return Ok(());
        }

        self.set_status(job_id, JobStatus::Staging, PROGRESS_STAGING);
        let ndjson = to_ndjson(&records)?;
        let bucket = config
            .staging_bucket
            .clone()
            .unwrap_or_else(|| self.config.staging_bucket.clone());
        let base_name = base_name(config.source.file_name());

        let staged_uri = stage_records(self.store.as_ref(), &bucket, &base_name, ndjson).await?;
        self.update_job(job_id, |job| job.staged_uri = Some(staged_uri.clone()));
        self.append_log(
            job_id,
            JobLogLevel::Info,
            format!("Converted records staged at {}", staged_uri),
        );

        if self.is_cancelled(job_id) {
            return Ok(());
        }

        self.set_status(job_id, JobStatus::Loading, PROGRESS_LOADING);
        let external_id = submit_load(
            self.warehouse.as_ref(),
            &destination,
            &staged_uri,
            schema.as_deref(),
        )
        .await?;

        self.update_job(job_id, |job| {
            job.external_load_job_id = Some(external_id.clone())
        });
        self.append_log(
            job_id,
            JobLogLevel::Info,
            format!("Warehouse load job started: {}", external_id),
        );

        let Some(handle) = self.handle(job_id) else {
            return Ok(());
        };
        let cancel = handle.cancel.clone();

        let outcome = monitor_load_job(
            self.warehouse.as_ref(),
            &destination.project_id,
            &external_id,
            &self.config.monitor,
            &cancel,
            &mut |level, message| self.append_log(job_id, level, message),
        )
        .await?;

        match outcome {
            MonitorOutcome::Cancelled => Ok(()),
            MonitorOutcome::Done(_) => {
                self.complete_job(job_id);
                Ok(())
            },
        }
    }

    /// Turn the raw input into flattened records, per input kind
    async fn produce_records(
        &self,
        job_id: Uuid,
        config: &JobConfig,
        input_kind: InputKind,
        bytes: &[u8],
    ) -> Result<Vec<Record>> {
        match input_kind {
            InputKind::ShapefileArchive => {
                let extracted = extract_archive(bytes)?;
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    format!("Extracted {} files from archive", extracted.files.len()),
                );

                self.set_status(job_id, JobStatus::Converting, PROGRESS_CONVERTING);
                let collection =
                    convert_to_feature_collection(&self.config.convert, &extracted.primary_path)
                        .await?;
                self.append_log(
                    job_id,
                    JobLogLevel::Info,
                    format!("Converted {} features", collection.features.len()),
                );

                self.set_status(job_id, JobStatus::Encoding, PROGRESS_ENCODING);
                encode_features(collection, config.geometry_encoding).collect()
            },
            InputKind::Json => {
                self.set_status(job_id, JobStatus::Encoding, PROGRESS_ENCODING);
                parse_json_records(bytes)
            },
            InputKind::Csv => {
                self.set_status(job_id, JobStatus::Encoding, PROGRESS_ENCODING);
                parse_csv_records(bytes)
            },
        }
    }
}

/// Source file name without its extension, for staging paths
fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_strips_extension() {
        assert_eq!(base_name("parcels.zip"), "parcels");
        assert_eq!(base_name("parcels.tar.gz"), "parcels.tar");
        assert_eq!(base_name("parcels"), "parcels");
    }
}
