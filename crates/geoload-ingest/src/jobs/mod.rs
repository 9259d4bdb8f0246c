//! Job tracking and orchestration
//!
//! A Job is the unit of work tracked end-to-end: created by the
//! orchestrator, owned by it for its entire life, mutated only through its
//! update path, and observable through snapshots and a watch subscription.

pub mod models;
pub mod orchestrator;

pub use models::{
    InputKind, Job, JobConfig, JobLog, JobLogLevel, JobSource, JobStats, JobStatus, SubmitSource,
};
pub use orchestrator::JobOrchestrator;
