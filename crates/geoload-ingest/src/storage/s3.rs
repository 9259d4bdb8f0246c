//! S3-backed object store

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use geoload_common::{GeoloadError, Result};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectStore};

/// Object store backed by an S3-compatible service (AWS S3, MinIO, ...)
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        debug!("Initializing S3 object store with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "geoload-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("S3 object store client initialized");

        Self { client }
    }

    /// Build a store from the ambient AWS environment
    ///
    /// Uses the SDK's default credential chain and region resolution
    /// instead of explicit `S3_*` settings.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::from_env().load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String> {
        let size = data.len();
        let checksum = calculate_sha256(&data);

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, path);

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(path)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| {
            GeoloadError::Storage(format!("Failed to upload to s3://{}/{}: {}", bucket, path, e))
        })?;

        info!(
            checksum = %checksum,
            "Successfully uploaded to s3://{}/{}", bucket, path
        );

        Ok(format!("s3://{}/{}", bucket, path))
    }

    #[instrument(skip(self))]
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, path);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                GeoloadError::Storage(format!(
                    "Failed to download from s3://{}/{}: {}",
                    bucket, path, e
                ))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| GeoloadError::Storage(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, path);

        Ok(data)
    }
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_sha256() {
        let data = b"Hello, World!";
        let checksum = calculate_sha256(data);
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
