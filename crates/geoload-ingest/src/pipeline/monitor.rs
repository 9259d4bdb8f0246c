//! Load job monitoring
//!
//! Polls the warehouse's job-status endpoint on a fixed interval with a
//! bounded attempt budget and translates the terminal state into a pipeline
//! outcome. Transient polling errors are logged as warnings and retried
//! within the same budget; exhausting the budget while the load is still
//! PENDING/RUNNING produces a timeout distinguishable from a
//! warehouse-reported failure, so operators know to check the load job
//! manually rather than assume data loss.
//!
//! The loop suspends for extended wall-clock time, so it is cooperative:
//! cancellation is checked between polls and sleeps never outlive the token.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PipelineError, Result};
use crate::jobs::JobLogLevel;
use crate::warehouse::{LoadJobState, LoadStats, Warehouse};

/// Default seconds between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default seconds to back off after a transient polling error.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 3;

/// Default attempt budget (~2.5 minutes of polling at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub retry_backoff_secs: u64,
    pub max_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// How a monitoring pass ended short of an error
#[derive(Debug, Clone)]
pub enum MonitorOutcome {
    /// The load finished cleanly
    Done(Option<LoadStats>),
    /// The owning job was cancelled; no further polls were scheduled
    Cancelled,
}

/// Poll `external_job_id` until it finishes, fails, or the budget runs out
///
/// `on_log` receives the job-visible log lines (poll progress, transient
/// warnings) so they land in the Job's log as well as the process log.
pub async fn monitor_load_job(
    warehouse: &dyn Warehouse,
    project_id: &str,
    external_job_id: &str,
    config: &MonitorConfig,
    cancel: &CancellationToken,
    on_log: &mut (dyn FnMut(JobLogLevel, String) + Send),
) -> Result<MonitorOutcome> {
    let mut attempts = 0;

    while attempts < config.max_attempts {
        if cancel.is_cancelled() {
            debug!(external_job_id, "Monitoring cancelled");
            return Ok(MonitorOutcome::Cancelled);
        }

        attempts += 1;

        let backoff = match warehouse.get_job_status(project_id, external_job_id).await {
            Ok(status) => match status.state {
                LoadJobState::Done => {
                    if !status.errors.is_empty() {
                        let message = status
                            .errors
                            .iter()
                            .map(|e| e.message.clone())
                            .collect::<Vec<_>>()
                            .join(", ");
                        return Err(PipelineError::WarehouseJobFailed(message));
                    }

                    if let Some(stats) = &status.statistics {
                        info!(
                            external_job_id,
                            output_rows = ?stats.output_rows,
                            output_bytes = ?stats.output_bytes,
                            "Warehouse load job completed"
                        );
                    }
                    on_log(
                        JobLogLevel::Info,
                        "Warehouse load job completed successfully".to_string(),
                    );
                    return Ok(MonitorOutcome::Done(status.statistics));
                },
                state => {
                    on_log(
                        JobLogLevel::Info,
                        format!(
                            "Warehouse load job status: {} (attempt {})",
                            state.as_str(),
                            attempts
                        ),
                    );
                    config.poll_interval()
                },
            },
            Err(e) => {
                warn!(
                    external_job_id,
                    attempt = attempts,
                    error = %e,
                    "Failed to check load job status"
                );
                on_log(
                    JobLogLevel::Warn,
                    format!("Failed to check load job status (attempt {}): {}", attempts, e),
                );
                config.retry_backoff()
            },
        };

        if attempts < config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(external_job_id, "Monitoring cancelled during backoff");
                    return Ok(MonitorOutcome::Cancelled);
                },
                _ = tokio::time::sleep(backoff) => {},
            }
        }
    }

    Err(PipelineError::MonitoringTimeout(format!(
        "Load job monitoring timed out after {} attempts; \
         check warehouse job {} manually",
        config.max_attempts, external_job_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{LoadJobStatus, MemoryWarehouse, Warehouse};
    use geoload_common::TableDestination;

    fn quick_config(max_attempts: u32) -> MonitorConfig {
        MonitorConfig {
            poll_interval_secs: 5,
            retry_backoff_secs: 3,
            max_attempts,
        }
    }

    async fn submitted(warehouse: &MemoryWarehouse) -> String {
        warehouse
            .submit_load_job(
                "mem://staging/x.ndjson",
                &TableDestination::new("acme-gis", "geo", "parcels"),
                None,
            )
            .await
            .unwrap()
    }

    fn sink() -> impl FnMut(JobLogLevel, String) {
        |_, _| {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_without_errors_is_success() {
        let warehouse = MemoryWarehouse::new();
        let job_id = submitted(&warehouse).await;
        let cancel = CancellationToken::new();
        let mut logs = sink();

        let outcome = monitor_load_job(
            &warehouse,
            "acme-gis",
            &job_id,
            &quick_config(30),
            &cancel,
            &mut logs,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, MonitorOutcome::Done(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_with_errors_is_a_warehouse_failure() {
        let warehouse = MemoryWarehouse::with_script(vec![LoadJobStatus::done_with_errors(
            vec!["Invalid field name".to_string()],
        )]);
        let job_id = submitted(&warehouse).await;
        let cancel = CancellationToken::new();
        let mut logs = sink();

        let err = monitor_load_job(
            &warehouse,
            "acme-gis",
            &job_id,
            &quick_config(30),
            &cancel,
            &mut logs,
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::WarehouseJobFailed(message) => {
                assert_eq!(message, "Invalid field name");
            },
            other => panic!("expected WarehouseJobFailed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_is_a_timeout_not_a_warehouse_failure() {
        let warehouse = MemoryWarehouse::with_script(vec![LoadJobStatus::running()]);
        let job_id = submitted(&warehouse).await;
        let cancel = CancellationToken::new();
        let mut polls = 0;
        let mut logs = |_level: JobLogLevel, _message: String| polls += 1;

        let err = monitor_load_job(
            &warehouse,
            "acme-gis",
            &job_id,
            &quick_config(30),
            &cancel,
            &mut logs,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::MonitoringTimeout(_)));
        assert!(err.to_string().contains("manually"));
        assert_eq!(polls, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried_within_budget() {
        let warehouse = MemoryWarehouse::new();
        let job_id = submitted(&warehouse).await;
        warehouse.fail_polls(2);

        let cancel = CancellationToken::new();
        let mut warnings = 0;
        let mut logs = |level: JobLogLevel, _message: String| {
            if level == JobLogLevel::Warn {
                warnings += 1;
            }
        };

        let outcome = monitor_load_job(
            &warehouse,
            "acme-gis",
            &job_id,
            &quick_config(30),
            &cancel,
            &mut logs,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, MonitorOutcome::Done(_)));
        assert_eq!(warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let warehouse = MemoryWarehouse::with_script(vec![LoadJobStatus::running()]);
        let job_id = submitted(&warehouse).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut logs = sink();

        let outcome = monitor_load_job(
            &warehouse,
            "acme-gis",
            &job_id,
            &quick_config(30),
            &cancel,
            &mut logs,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, MonitorOutcome::Cancelled));
    }
}
