//! Object storage collaborator
//!
//! The pipeline stages converted record streams in an object store and can
//! pull already-uploaded source datasets back out of it. The [`ObjectStore`]
//! trait is the narrow interface; the S3 implementation talks to a real
//! bucket while the in-memory implementation backs the simulated deployment
//! and the test suite. Which one runs is decided once at startup.

use async_trait::async_trait;
use geoload_common::Result;

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Object storage interface used by the pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object, returning its URI
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String>;

    /// Download an object's bytes
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
}
