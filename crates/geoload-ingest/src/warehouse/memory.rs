//! In-memory warehouse
//!
//! Simulated backend: records every dataset/table/load-job call and answers
//! status polls from a scripted sequence, so pipeline behavior (success,
//! warehouse-reported failure, never-finishing load, flaky polling) can be
//! exercised without a real warehouse.

use async_trait::async_trait;
use geoload_common::{SchemaField, TableDestination};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{LoadJobStatus, LoadStats, Result, Warehouse, WarehouseError};

/// One recorded load submission
#[derive(Debug, Clone)]
pub struct SubmittedLoad {
    pub job_id: String,
    pub source_uri: String,
    pub destination: TableDestination,
    pub schema: Option<Vec<SchemaField>>,
}

#[derive(Default)]
struct State {
    datasets: HashSet<String>,
    tables: HashMap<String, Vec<SchemaField>>,
    submissions: Vec<SubmittedLoad>,
    cursors: HashMap<String, usize>,
    poll_failures: u32,
}

pub struct MemoryWarehouse {
    script: Vec<LoadJobStatus>,
    state: Mutex<State>,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    /// Warehouse whose load jobs run once and then finish cleanly
    pub fn new() -> Self {
        Self::with_script(vec![
            LoadJobStatus::running(),
            LoadJobStatus::done(Some(LoadStats {
                output_rows: Some(0),
                output_bytes: Some(0),
            })),
        ])
    }

    /// Warehouse whose load jobs walk the given status sequence
    ///
    /// The final entry repeats once the script is exhausted, so a script of
    /// `[running()]` simulates a load that never finishes.
    pub fn with_script(script: Vec<LoadJobStatus>) -> Self {
        assert!(!script.is_empty(), "status script must not be empty");
        Self {
            script,
            state: Mutex::new(State::default()),
        }
    }

    /// Make the next `n` status polls fail with a transport error
    pub fn fail_polls(&self, n: u32) {
        self.lock().poll_failures = n;
    }

    pub fn submissions(&self) -> Vec<SubmittedLoad> {
        self.lock().submissions.clone()
    }

    pub fn dataset_exists(&self, project_id: &str, dataset_id: &str) -> bool {
        self.lock()
            .datasets
            .contains(&format!("{}.{}", project_id, dataset_id))
    }

    pub fn table_schema(&self, destination: &TableDestination) -> Option<Vec<SchemaField>> {
        self.lock().tables.get(&destination.to_string()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_dataset(&self, project_id: &str, dataset_id: &str) -> Result<()> {
        let mut state = self.lock();
        let key = format!("{}.{}", project_id, dataset_id);
        if !state.datasets.insert(key) {
            debug!("Dataset {}.{} already exists, continuing", project_id, dataset_id);
        }
        Ok(())
    }

    async fn ensure_table(
        &self,
        destination: &TableDestination,
        schema: &[SchemaField],
    ) -> Result<()> {
        let mut state = self.lock();
        let key = destination.to_string();
        if state.tables.contains_key(&key) {
            debug!("Table {} already exists, continuing", destination);
            return Ok(());
        }
        state.tables.insert(key, schema.to_vec());
        Ok(())
    }

    async fn submit_load_job(
        &self,
        source_uri: &str,
        destination: &TableDestination,
        schema: Option<&[SchemaField]>,
    ) -> Result<String> {
        let job_id = format!("geoload_{}", Uuid::new_v4().simple());
        let mut state = self.lock();
        state.submissions.push(SubmittedLoad {
            job_id: job_id.clone(),
            source_uri: source_uri.to_string(),
            destination: destination.clone(),
            schema: schema.map(|s| s.to_vec()),
        });
        state.cursors.insert(job_id.clone(), 0);
        debug!(job_id = %job_id, "Simulated load job submitted");
        Ok(job_id)
    }

    async fn get_job_status(&self, _project_id: &str, job_id: &str) -> Result<LoadJobStatus> {
        let mut state = self.lock();

        if state.poll_failures > 0 {
            state.poll_failures -= 1;
            return Err(WarehouseError::Transport(
                "simulated network failure".to_string(),
            ));
        }

        let cursor = *state
            .cursors
            .get(job_id)
            .ok_or_else(|| WarehouseError::Api {
                status: 404,
                message: format!("Not found: Job {}", job_id),
            })?;

        let status = self.script[cursor.min(self.script.len() - 1)].clone();
        state.cursors.insert(job_id.to_string(), cursor + 1);
        Ok(status)
    }
}
