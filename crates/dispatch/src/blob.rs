//! Blob store access for referenced deploy events.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, info};

use craft_core::config::AwsConfig;
use craft_core::event::ObjectRef;

use crate::error::FetchError;

/// Read access to the objects deploy events point at.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, object: &ObjectRef) -> Result<Bytes, FetchError>;
}

/// [`BlobStore`] over an `object_store` backend bound to a single bucket.
pub struct ObjectStoreBlobs {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobs {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
        }
    }

    /// S3 backend for `bucket`.
    pub fn s3(aws: &AwsConfig, bucket: &str) -> Result<Self, FetchError> {
        // from_env picks up container and instance credentials when no
        // static keys are configured.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&aws.region)
            .with_bucket_name(bucket);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = aws.endpoint() {
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_endpoint(endpoint);
        }

        let store = builder
            .build()
            .map_err(|e| FetchError::Store(format!("S3 client for {bucket}: {e}")))?;

        info!(bucket, region = %aws.region, "Blob store: S3 backend");
        Ok(Self::new(bucket, Arc::new(store)))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn fetch(&self, object: &ObjectRef) -> Result<Bytes, FetchError> {
        if object.bucket != self.bucket {
            return Err(FetchError::UnknownBucket {
                expected: self.bucket.clone(),
                actual: object.bucket.clone(),
            });
        }

        debug!(object = %object, "Fetching deploy event");
        let location = object_path(&object.key)?;
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_store_error(object, e))?;
        result.bytes().await.map_err(|e| map_store_error(object, e))
    }
}

/// Store path for an S3 key, kept verbatim.
///
/// `Path::from` would percent-encode characters such as `~` or `%` and then
/// look up a different key. Keys that `Path::parse` cannot take as-is fail
/// here instead of surfacing as a missing object.
fn object_path(key: &str) -> Result<Path, FetchError> {
    let path = Path::parse(key).map_err(|e| FetchError::UnsupportedKey {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    if path.as_ref() != key {
        return Err(FetchError::UnsupportedKey {
            key: key.to_string(),
            reason: "leading or trailing `/`".into(),
        });
    }
    Ok(path)
}

fn map_store_error(object: &ObjectRef, err: object_store::Error) -> FetchError {
    match err {
        object_store::Error::NotFound { .. } => FetchError::NotFound(object.to_string()),
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. } => {
            FetchError::AccessDenied(object.to_string())
        }
        other => FetchError::Store(format!("{object}: {other}")),
    }
}
