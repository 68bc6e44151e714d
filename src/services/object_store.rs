//! Bucket access.
//!
//! Everything above this module talks to [`ObjectStoreClient`]; the cloud
//! implementation wraps the `object_store` crate for GCS or S3.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use http::Method;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    aws::{AmazonS3, AmazonS3Builder},
    gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder},
    path::Path as ObjectPath,
    signer::Signer,
};
use std::{
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use crate::config::StorageProvider;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("bucket listing timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound(path),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type ObjectByteStream = BoxStream<'static, StoreResult<Bytes>>;

/// The bucket operations the gallery needs.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Bucket name, for logging.
    fn bucket(&self) -> &str;

    /// Every object in the bucket as `(key, size)`.
    fn list_objects(&self) -> BoxStream<'_, StoreResult<ObjectEntry>>;

    /// Time-limited read URL for `key`.
    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StoreResult<String>;

    async fn read_object(&self, key: &str) -> StoreResult<ObjectByteStream>;

    async fn write_object(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<()>;

    async fn delete_object(&self, key: &str) -> StoreResult<()>;
}

/// Collects the full listing, giving up after `timeout`.
pub async fn list_all(
    store: &dyn ObjectStoreClient,
    timeout: Duration,
) -> StoreResult<Vec<ObjectEntry>> {
    let listing = store.list_objects().try_collect::<Vec<_>>();
    match tokio::time::timeout(timeout, listing).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Streams `key` into `dest`.
///
/// Writes go to a temp file beside `dest` that is renamed into place only
/// after the stream completes, so a failed download leaves nothing behind.
pub async fn download_to_file(
    store: &dyn ObjectStoreClient,
    key: &str,
    dest: &Path,
) -> StoreResult<u64> {
    let parent = dest.parent().ok_or_else(|| {
        StoreError::Io(io::Error::new(
            ErrorKind::InvalidInput,
            "download destination has no parent directory",
        ))
    })?;
    let tmp_path = parent.join(format!(".download-{}", Uuid::new_v4()));

    let mut stream = store.read_object(key).await?;
    let mut file = File::create(&tmp_path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        written += chunk.len() as u64;
        if let Err(err) = file.write_all(&chunk).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StoreError::Io(err));
    }
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, dest).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StoreError::Io(err));
    }
    debug!(key, bytes = written, path = %dest.display(), "downloaded object");
    Ok(written)
}

/// A GCS or S3 bucket reached through `object_store`.
///
/// Credentials come from the environment the same way the provider SDKs
/// read them (`GOOGLE_SERVICE_ACCOUNT`, `AWS_ACCESS_KEY_ID`, ...).
#[derive(Debug)]
pub struct CloudBucket<S> {
    bucket: String,
    store: S,
}

impl CloudBucket<GoogleCloudStorage> {
    pub fn gcs(bucket: &str) -> StoreResult<Self> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Self {
            bucket: bucket.to_string(),
            store,
        })
    }
}

impl CloudBucket<AmazonS3> {
    pub fn s3(bucket: &str) -> StoreResult<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Self {
            bucket: bucket.to_string(),
            store,
        })
    }
}

/// Connects to `bucket` on the configured provider.
pub fn connect(
    provider: StorageProvider,
    bucket: &str,
) -> StoreResult<Arc<dyn ObjectStoreClient>> {
    let store: Arc<dyn ObjectStoreClient> = match provider {
        StorageProvider::Gcs => Arc::new(CloudBucket::gcs(bucket)?),
        StorageProvider::S3 => Arc::new(CloudBucket::s3(bucket)?),
    };
    Ok(store)
}

#[async_trait]
impl<S> ObjectStoreClient for CloudBucket<S>
where
    S: ObjectStore + Signer,
{
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_objects(&self) -> BoxStream<'_, StoreResult<ObjectEntry>> {
        self.store
            .list(None)
            .map(|item| {
                item.map(|meta| ObjectEntry {
                    key: meta.location.to_string(),
                    size: meta.size,
                })
                .map_err(StoreError::from)
            })
            .boxed()
    }

    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        let path = ObjectPath::from(key);
        let url = self.store.signed_url(Method::GET, &path, ttl).await?;
        Ok(url.to_string())
    }

    async fn read_object(&self, key: &str) -> StoreResult<ObjectByteStream> {
        let path = ObjectPath::from(key);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream().map_err(StoreError::from).boxed())
    }

    async fn write_object(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<()> {
        let path = ObjectPath::from(key);
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&path, PutPayload::from(data), options)
            .await?;
        debug!(bucket = %self.bucket, key, content_type, "wrote object");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        let path = ObjectPath::from(key);
        self.store.delete(&path).await?;
        debug!(bucket = %self.bucket, key, "deleted object");
        Ok(())
    }
}
