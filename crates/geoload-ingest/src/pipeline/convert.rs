//! Geometry conversion
//!
//! Delegates to the external `ogr2ogr` utility to normalize the primary
//! geometry file into a GeoJSON feature collection. A non-zero exit code is
//! a deterministic input problem, not a transient failure, so there are no
//! retries. The intermediate GeoJSON file is written next to the input
//! inside the extraction temp directory and removed with it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use super::geojson::FeatureCollection;
use super::{PipelineError, Result};

/// Default conversion utility binary name
pub const DEFAULT_OGR2OGR_PATH: &str = "ogr2ogr";

/// Configuration for the external conversion utility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Name or path of the `ogr2ogr` binary
    pub ogr2ogr_path: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            ogr2ogr_path: DEFAULT_OGR2OGR_PATH.to_string(),
        }
    }
}

/// Convert the primary geometry file into a feature collection
pub async fn convert_to_feature_collection(
    config: &ConvertConfig,
    primary_path: &Path,
) -> Result<FeatureCollection> {
    let output_path = primary_path.with_extension("geojson");

    debug!(
        "Converting {} -> {} via {}",
        primary_path.display(),
        output_path.display(),
        config.ogr2ogr_path
    );

    let output = Command::new(&config.ogr2ogr_path)
        .arg("-f")
        .arg("GeoJSON")
        .arg(&output_path)
        .arg(primary_path)
        .output()
        .await
        .map_err(|e| {
            PipelineError::Conversion(format!("Failed to run {}: {}", config.ogr2ogr_path, e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(PipelineError::Conversion(format!(
            "{} exited with {}: {}",
            config.ogr2ogr_path, output.status, stderr
        )));
    }

    let bytes = tokio::fs::read(&output_path).await?;
    // The extraction temp dir also removes this on drop; deleting eagerly
    // keeps large intermediates from accumulating while the job continues.
    let _ = tokio::fs::remove_file(&output_path).await;

    let collection: FeatureCollection = serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::Conversion(format!("Invalid conversion output: {}", e)))?;

    info!(
        "Converted {} into {} features",
        primary_path.display(),
        collection.features.len()
    );

    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_binary_is_a_conversion_error() {
        let config = ConvertConfig {
            ogr2ogr_path: "ogr2ogr-does-not-exist".to_string(),
        };
        let err = convert_to_feature_collection(&config, Path::new("/tmp/in.shp"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conversion(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        // Stand-in utility that fails with a diagnostic on stderr.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ogr2ogr");
        {
            let mut f = std::fs::File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            writeln!(f, "echo 'ERROR: unsupported geometry' >&2").unwrap();
            writeln!(f, "exit 1").unwrap();
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let config = ConvertConfig {
            ogr2ogr_path: script.to_string_lossy().to_string(),
        };
        let err = convert_to_feature_collection(&config, &dir.path().join("in.shp"))
            .await
            .unwrap_err();

        match err {
            PipelineError::Conversion(message) => {
                assert!(message.contains("unsupported geometry"), "{}", message);
            },
            other => panic!("expected Conversion error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_successful_conversion_parses_and_removes_output() {
        // Stand-in utility that writes a fixed feature collection.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ogr2ogr");
        {
            let mut f = std::fs::File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            writeln!(
                f,
                "printf '%s' '{{\"type\":\"FeatureCollection\",\"features\":[{{\"type\":\"Feature\",\"geometry\":{{\"type\":\"Point\",\"coordinates\":[1.0,2.0]}},\"properties\":{{\"name\":\"a\"}}}}]}}' > \"$3\""
            )
            .unwrap();
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let primary = dir.path().join("in.shp");
        std::fs::write(&primary, b"ignored").unwrap();

        let config = ConvertConfig {
            ogr2ogr_path: script.to_string_lossy().to_string(),
        };
        let collection = convert_to_feature_collection(&config, &primary)
            .await
            .unwrap();

        assert_eq!(collection.features.len(), 1);
        assert!(!primary.with_extension("geojson").exists());
    }
}
