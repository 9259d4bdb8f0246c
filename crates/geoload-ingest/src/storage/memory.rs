//! In-memory object store
//!
//! Backs the simulated deployment mode and the test suite. Objects live in
//! a process-local map; URIs use the `mem://` scheme so logs make the
//! backend unambiguous.

use async_trait::async_trait;
use geoload_common::{GeoloadError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::ObjectStore;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail with the given message
    pub fn fail_uploads(&self, message: impl Into<String>) {
        *self.fail_uploads.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    /// Fetch a stored object without going through the trait
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&object_key(bucket, path))
            .cloned()
    }

    /// Seed an object, e.g. a remote source dataset
    pub fn put_object(&self, bucket: &str, path: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(object_key(bucket, path), data);
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<String> {
        if let Some(message) = self
            .fail_uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(GeoloadError::Storage(message));
        }

        debug!("Storing {} bytes at mem://{}/{}", data.len(), bucket, path);
        self.put_object(bucket, path, data);
        Ok(format!("mem://{}/{}", bucket, path))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.object(bucket, path).ok_or_else(|| {
            GeoloadError::Storage(format!("No such object: mem://{}/{}", bucket, path))
        })
    }
}
