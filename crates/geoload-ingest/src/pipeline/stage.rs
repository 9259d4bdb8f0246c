//! Staging upload
//!
//! Writes the encoded record stream to the object store under a
//! deterministic, timestamped path ahead of the warehouse load. An upload
//! failure is fatal for the job; retries happen only as whole-job
//! resubmission.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{PipelineError, Result};
use crate::storage::ObjectStore;

/// Path segment separating staged objects from raw uploads
pub const STAGING_SUBAREA: &str = "converted";

/// Content type of staged record streams
const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Deterministic staging path: `{date}/{subarea}/{timestamp}_{base}.ndjson`
///
/// The millisecond timestamp keeps concurrent jobs on the same calendar day
/// from colliding.
pub fn staging_key(base_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}_{}.ndjson",
        now.format("%Y-%m-%d"),
        STAGING_SUBAREA,
        now.timestamp_millis(),
        base_name
    )
}

/// Upload the record stream, returning the staged object's URI
pub async fn stage_records(
    store: &dyn ObjectStore,
    bucket: &str,
    base_name: &str,
    ndjson: Vec<u8>,
) -> Result<String> {
    let key = staging_key(base_name, Utc::now());
    let size = ndjson.len();

    let uri = store
        .upload(
            bucket,
            &key,
            ndjson,
            Some(NDJSON_CONTENT_TYPE.to_string()),
        )
        .await
        .map_err(|e| PipelineError::Staging(e.to_string()))?;

    info!("Staged {} bytes at {}", size, uri);
    Ok(uri)
}
