//! Load submission
//!
//! Ensures the destination dataset and table exist (idempotently) and
//! submits the warehouse load job referencing the staged object. With no
//! schema the load is submitted in auto-detect mode and table creation is
//! skipped.

use geoload_common::{SchemaField, TableDestination};
use tracing::{debug, info};

use super::{PipelineError, Result};
use crate::warehouse::Warehouse;

/// Submit a load of `source_uri` into `destination`
pub async fn submit_load(
    warehouse: &dyn Warehouse,
    destination: &TableDestination,
    source_uri: &str,
    schema: Option<&[SchemaField]>,
) -> Result<String> {
    if let Some(schema) = schema {
        debug!("Ensuring destination table {} exists", destination);
        warehouse
            .ensure_dataset(&destination.project_id, &destination.dataset_id)
            .await
            .map_err(|e| PipelineError::LoadSubmission(e.to_string()))?;
        warehouse
            .ensure_table(destination, schema)
            .await
            .map_err(|e| PipelineError::LoadSubmission(e.to_string()))?;
    } else {
        debug!("No schema supplied; the warehouse will auto-detect");
    }

    let external_job_id = warehouse
        .submit_load_job(source_uri, destination, schema)
        .await
        .map_err(|e| PipelineError::LoadSubmission(e.to_string()))?;

    info!(
        external_job_id = %external_job_id,
        "Load of {} into {} submitted", source_uri, destination
    );

    Ok(external_job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use geoload_common::{FieldMode, FieldType};

    fn destination() -> TableDestination {
        TableDestination::new("acme-gis", "geo", "parcels")
    }

    fn schema() -> Vec<SchemaField> {
        vec![
            SchemaField::new("parcel", FieldType::String, FieldMode::Required),
            SchemaField::new("geometry", FieldType::Geography, FieldMode::Nullable),
        ]
    }

    #[tokio::test]
    async fn test_submit_with_schema_creates_dataset_and_table() {
        let warehouse = MemoryWarehouse::new();
        let schema = schema();

        let job_id = submit_load(
            &warehouse,
            &destination(),
            "mem://staging/x.ndjson",
            Some(&schema),
        )
        .await
        .unwrap();

        assert!(!job_id.is_empty());
        assert!(warehouse.dataset_exists("acme-gis", "geo"));
        assert_eq!(warehouse.table_schema(&destination()), Some(schema.clone()));

        let submissions = warehouse.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].schema.as_deref(), Some(schema.as_slice()));
    }

    #[tokio::test]
    async fn test_submit_without_schema_skips_table_creation() {
        let warehouse = MemoryWarehouse::new();

        submit_load(&warehouse, &destination(), "mem://staging/x.ndjson", None)
            .await
            .unwrap();

        assert!(!warehouse.dataset_exists("acme-gis", "geo"));
        assert!(warehouse.table_schema(&destination()).is_none());
        assert!(warehouse.submissions()[0].schema.is_none());
    }

    #[tokio::test]
    async fn test_resubmission_tolerates_existing_table() {
        let warehouse = MemoryWarehouse::new();
        let schema = schema();

        for _ in 0..2 {
            submit_load(
                &warehouse,
                &destination(),
                "mem://staging/x.ndjson",
                Some(&schema),
            )
            .await
            .unwrap();
        }

        assert_eq!(warehouse.submissions().len(), 2);
    }
}
