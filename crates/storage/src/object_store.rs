//! Object storage interface for snapshot retrieval (S3/MinIO/R2 compatible).

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use bikeshare_common::{BikeResult, BikeshareError};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3-compatible endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region ("auto" for R2, "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

/// Read-only object storage client.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> BikeResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| BikeshareError::Retrieval(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store (in-memory or local filesystem backends).
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Open a byte stream for an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get_stream(&self, path: &str) -> BikeResult<BoxStream<'static, BikeResult<Bytes>>> {
        let location = Path::from(path);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => BikeshareError::Retrieval(format!(
                "Object not found: s3://{}/{}",
                self.bucket, path
            )),
            e => BikeshareError::Retrieval(format!("Failed to read {}: {}", path, e)),
        })?;

        debug!(size = result.meta.size, "Opened object");

        let path = path.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| {
                BikeshareError::Retrieval(format!("Failed to read bytes of {}: {}", path, e))
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    async fn storage_with(key: &str, data: &'static [u8]) -> ObjectStorage {
        let store = InMemory::new();
        store
            .put(&Path::from(key), Bytes::from_static(data).into())
            .await
            .unwrap();
        ObjectStorage::from_store(Arc::new(store), "snapshots")
    }

    #[tokio::test]
    async fn test_get_stream_reads_all_bytes() {
        let storage = storage_with("db/usage.sqlite", b"hello snapshot").await;
        let chunks: Vec<Bytes> = storage
            .get_stream("db/usage.sqlite")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let data: Vec<u8> = chunks.concat();
        assert_eq!(data, b"hello snapshot");
    }

    #[tokio::test]
    async fn test_missing_object_is_retrieval_error() {
        let storage = storage_with("db/usage.sqlite", b"x").await;
        let err = storage.get_stream("db/other.sqlite").await.err().unwrap();
        assert!(matches!(err, BikeshareError::Retrieval(msg) if msg.contains("not found")));
    }
}
