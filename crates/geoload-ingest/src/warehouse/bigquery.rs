//! BigQuery-style REST warehouse client
//!
//! Speaks the v2 jobs/datasets/tables API with bearer-token authentication
//! supplied by the identity collaborator.

use geoload_common::{SchemaField, TableDestination};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LoadJobState, LoadJobStatus, LoadStats, Result, Warehouse, WarehouseError};
use crate::auth::TokenProvider;

// ============================================================================
// Warehouse Client Constants
// ============================================================================

/// Default warehouse API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// OAuth scope required for every warehouse request.
pub const WAREHOUSE_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Default timeout for warehouse API requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Source format of staged objects.
const SOURCE_FORMAT: &str = "NEWLINE_DELIMITED_JSON";

/// Warehouse client over the BigQuery v2 REST API
pub struct BigQueryWarehouse {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl BigQueryWarehouse {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, tokens)
    }

    /// Create a client against a non-default endpoint (emulators, tests)
    pub fn with_base_url(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            tokens,
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        if !self.tokens.is_authorized(&[WAREHOUSE_SCOPE]) {
            return Err(WarehouseError::Auth(format!(
                "credential is missing the required scope: {}",
                WAREHOUSE_SCOPE
            )));
        }

        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| WarehouseError::Auth(e.to_string()))?;

        Ok(token.token)
    }

    /// Map a non-success response to an API error with the payload's message
    async fn api_error(response: reqwest::Response) -> WarehouseError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => "Unknown error".to_string(),
        };
        WarehouseError::Api { status, message }
    }

    fn is_already_exists(status: u16, message: &str) -> bool {
        status == 409 || message.to_lowercase().contains("already exists")
    }
}

#[async_trait::async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn ensure_dataset(&self, project_id: &str, dataset_id: &str) -> Result<()> {
        let url = format!("{}/projects/{}/datasets", self.base_url, project_id);
        debug!("Creating dataset {}.{}", project_id, dataset_id);

        let body = DatasetInsertRequest {
            dataset_reference: DatasetReference {
                project_id: project_id.to_string(),
                dataset_id: dataset_id.to_string(),
            },
        };

        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            info!("Dataset {}.{} created", project_id, dataset_id);
            return Ok(());
        }

        match Self::api_error(response).await {
            WarehouseError::Api { status, message }
                if Self::is_already_exists(status, &message) =>
            {
                debug!("Dataset {}.{} already exists, continuing", project_id, dataset_id);
                Ok(())
            },
            err => Err(err),
        }
    }

    async fn ensure_table(
        &self,
        destination: &TableDestination,
        schema: &[SchemaField],
    ) -> Result<()> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url, destination.project_id, destination.dataset_id
        );
        debug!("Creating table {} with {} fields", destination, schema.len());

        let body = TableInsertRequest {
            table_reference: TableReference::from(destination),
            schema: TableSchema {
                fields: schema.to_vec(),
            },
        };

        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            info!("Table {} created", destination);
            return Ok(());
        }

        match Self::api_error(response).await {
            WarehouseError::Api { status, message }
                if Self::is_already_exists(status, &message) =>
            {
                debug!("Table {} already exists, continuing", destination);
                Ok(())
            },
            err => Err(err),
        }
    }

    async fn submit_load_job(
        &self,
        source_uri: &str,
        destination: &TableDestination,
        schema: Option<&[SchemaField]>,
    ) -> Result<String> {
        let url = format!("{}/projects/{}/jobs", self.base_url, destination.project_id);
        let job_id = format!("geoload_{}", Uuid::new_v4().simple());

        debug!(
            job_id = %job_id,
            autodetect = schema.is_none(),
            "Submitting load of {} into {}", source_uri, destination
        );

        let body = JobInsertRequest {
            job_reference: JobReference {
                project_id: destination.project_id.clone(),
                job_id: job_id.clone(),
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec![source_uri.to_string()],
                    destination_table: TableReference::from(destination),
                    write_disposition: "WRITE_TRUNCATE".to_string(),
                    create_disposition: "CREATE_IF_NEEDED".to_string(),
                    source_format: SOURCE_FORMAT.to_string(),
                    autodetect: schema.is_none(),
                    schema: schema.map(|fields| TableSchema {
                        fields: fields.to_vec(),
                    }),
                },
            },
        };

        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        info!(job_id = %job_id, "Warehouse load job submitted");
        Ok(job_id)
    }

    async fn get_job_status(&self, project_id: &str, job_id: &str) -> Result<LoadJobStatus> {
        let url = format!("{}/projects/{}/jobs/{}", self.base_url, project_id, job_id);

        let token = self.bearer_token().await?;
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let resource: JobResource = response.json().await?;
        resource.into_status()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetInsertRequest {
    dataset_reference: DatasetReference,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableInsertRequest {
    table_reference: TableReference,
    schema: TableSchema,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

impl From<&TableDestination> for TableReference {
    fn from(dest: &TableDestination) -> Self {
        Self {
            project_id: dest.project_id.clone(),
            dataset_id: dest.dataset_id.clone(),
            table_id: dest.table_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct TableSchema {
    fields: Vec<SchemaField>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsertRequest {
    job_reference: JobReference,
    configuration: JobConfiguration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
}

#[derive(Serialize)]
struct JobConfiguration {
    load: LoadConfiguration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration {
    source_uris: Vec<String>,
    destination_table: TableReference,
    write_disposition: String,
    create_disposition: String,
    source_format: String,
    autodetect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<TableSchema>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    status: JobStatusResource,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Deserialize)]
struct JobStatusResource {
    state: String,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
    output_bytes: Option<String>,
}

impl JobResource {
    fn into_status(self) -> Result<LoadJobStatus> {
        let state = match self.status.state.as_str() {
            "PENDING" => LoadJobState::Pending,
            "RUNNING" => LoadJobState::Running,
            "DONE" => LoadJobState::Done,
            other => {
                return Err(WarehouseError::InvalidResponse(format!(
                    "unknown load job state: {}",
                    other
                )))
            },
        };

        let statistics = self.statistics.and_then(|s| s.load).map(|load| LoadStats {
            output_rows: load.output_rows.and_then(|v| v.parse().ok()),
            output_bytes: load.output_bytes.and_then(|v| v.parse().ok()),
        });

        Ok(LoadJobStatus {
            state,
            errors: self
                .status
                .errors
                .into_iter()
                .map(|e| super::LoadJobError {
                    reason: e.reason,
                    message: e.message,
                })
                .collect(),
            statistics,
        })
    }
}
