//! src/services/storage_service.rs
//!
//! StorageService — bucket and object operations over a [`StorageBackend`].
//! Object content lives at `{bucket}/{key}`; each object's metadata lives in
//! a JSON sidecar under `.metadata/` (see [`MetadataStore`]).

use super::{
    metadata_store::{MetadataStore, bucket_metadata_path, bucket_path, object_path},
    validation::{bucket_name_violation, is_valid_bucket_name, object_key_violation},
};
use crate::{
    models::{
        bucket::BucketInfo,
        metadata::{DEFAULT_CONTENT_TYPE, ObjectMetadata, SystemMetadata},
        object::{
            ByteStream, GetObjectResult, ObjectBody, ObjectStream, ObjectSummary,
            PutObjectOptions, PutObjectResult,
        },
    },
    storage::backend::{StagedWrite, StorageBackend, parent_path},
};
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },
    #[error("object key `{key}` invalid: {reason}")]
    InvalidObjectKey { key: String, reason: &'static str },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("reading the object body failed: {0}")]
    StreamIngestion(#[source] io::Error),
    #[error("metadata sidecar `{path}` unreadable: {source}")]
    Metadata {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides basic S3-like operations:
/// - Create, delete and list buckets
/// - Put an object (buffered or streamed; computes the MD5 etag)
/// - Get an object (whole, or as a stream) and its metadata
/// - Copy, delete and list objects
///
/// No locking is done: concurrent writers to the same key race, and the
/// last commit wins.
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    metadata: MetadataStore,
}

impl StorageService {
    /// Create a service over `backend`. The backend is shared by clones.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            metadata: MetadataStore::new(backend.clone()),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        match bucket_name_violation(name) {
            Some(reason) => Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        match object_key_violation(key) {
            Some(reason) => Err(StorageError::InvalidObjectKey {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Validate the name and check that the bucket directory exists.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        match self.backend.stat(&bucket_path(bucket)).await {
            Ok(stat) if stat.is_dir => Ok(()),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn object_not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Map a backend error on an object's content file.
    fn content_error(bucket: &str, key: &str, err: io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            Self::object_not_found(bucket, key)
        } else {
            StorageError::Io(err)
        }
    }

    /// Create a bucket: its content directory plus the parallel metadata
    /// directory. Creating an existing bucket succeeds.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<BucketInfo> {
        self.ensure_bucket_name_safe(name)?;
        self.backend.create_dir(&bucket_path(name)).await?;
        self.backend.create_dir(&bucket_metadata_path(name)).await?;
        debug!("created bucket {}", name);
        Ok(BucketInfo::new(name))
    }

    /// Delete an empty bucket along with its metadata directory.
    ///
    /// Emptiness is judged on the content files alone, so an object whose
    /// sidecar is unreadable still keeps its bucket alive.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.ensure_bucket(name).await?;

        if !self.backend.list(&bucket_path(name), None).await?.is_empty() {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        self.backend.remove_dir_all(&bucket_path(name)).await?;
        if let Err(err) = self.backend.remove_dir_all(&bucket_metadata_path(name)).await {
            if err.kind() != ErrorKind::NotFound {
                return Err(StorageError::Io(err));
            }
        }
        debug!("deleted bucket {}", name);
        Ok(())
    }

    /// List buckets, sorted by name.
    ///
    /// Only directories whose names are valid bucket names are reported, which
    /// hides the engine's dot-prefixed directories (`.metadata`, staging) and
    /// strays such as `lost+found`. Creation dates are synthesized.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let mut names = self.backend.list_dirs("").await?;
        names.retain(|name| is_valid_bucket_name(name));
        names.sort();
        Ok(names.into_iter().map(BucketInfo::new).collect())
    }

    /// Store an object and its metadata sidecar.
    ///
    /// Content and sidecar are both staged in full before anything becomes
    /// visible, then committed content first. If the body fails midway the
    /// staged content is discarded and the previous object (if any) is left
    /// untouched. A crash between the two commits leaves content without a
    /// sidecar, which reads then synthesize.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        options: PutObjectOptions,
    ) -> StorageResult<PutObjectResult> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;

        let mut content = self.backend.stage(&object_path(bucket, key)).await?;
        let (etag, size) = match body {
            ObjectBody::Buffered(bytes) => {
                content.write_chunk(&bytes).await?;
                (format!("{:x}", md5::compute(&bytes)), bytes.len() as u64)
            }
            ObjectBody::Streamed(stream) => ingest_stream(content.as_mut(), stream).await?,
        };

        let record = ObjectMetadata::new(
            SystemMetadata {
                content_type: options
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                size,
                last_modified: Utc::now(),
                etag: etag.clone(),
            },
            options.metadata,
        );
        let mut sidecar = self.metadata.stage(bucket, key, &record).await?;

        content.commit().await?;
        sidecar.commit().await?;
        debug!("stored {}/{} ({} bytes, etag {})", bucket, key, size, etag);

        Ok(PutObjectResult {
            etag,
            key: key.to_string(),
            bucket: bucket.to_string(),
            size,
        })
    }

    /// Fetch an object's content and metadata.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<GetObjectResult> {
        let metadata = self.get_object_metadata(bucket, key).await?;
        let body = self
            .backend
            .read(&object_path(bucket, key))
            .await
            .map_err(|err| Self::content_error(bucket, key, err))?;
        Ok(GetObjectResult { body, metadata })
    }

    /// Like [`get_object`](Self::get_object) but yields the content as a stream.
    ///
    /// The stream's `size` is the length of the opened file, which can differ
    /// from `system.size` when a concurrent put lands between the two reads.
    pub async fn get_object_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(ObjectMetadata, ObjectStream)> {
        let metadata = self.get_object_metadata(bucket, key).await?;
        let stream = self
            .backend
            .read_stream(&object_path(bucket, key))
            .await
            .map_err(|err| Self::content_error(bucket, key, err))?;
        Ok((metadata, stream))
    }

    /// Fetch only object metadata, synthesized when no sidecar exists.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;
        self.metadata.read(bucket, key).await
    }

    /// Delete an object's content and sidecar, then prune directories the
    /// delete emptied (never the bucket root itself).
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;

        let path = object_path(bucket, key);
        self.backend
            .delete(&path)
            .await
            .map_err(|err| Self::content_error(bucket, key, err))?;
        self.metadata.delete(bucket, key).await?;
        self.backend
            .prune_empty_dirs(parent_path(&path), &bucket_path(bucket))
            .await;
        debug!("deleted {}/{}", bucket, key);
        Ok(())
    }

    /// Copy an object by streaming the source content into a new put.
    ///
    /// Content type and caller fields are carried over; the etag is
    /// recomputed over the copied bytes.
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StorageResult<PutObjectResult> {
        self.ensure_key_safe(dst_key)?;
        self.ensure_bucket(dst_bucket).await?;

        let (metadata, source) = self.get_object_stream(src_bucket, src_key).await?;
        let options = PutObjectOptions {
            content_type: Some(metadata.system.content_type),
            metadata: metadata.user,
        };
        self.put_object(dst_bucket, dst_key, ObjectBody::Streamed(source.stream), options)
            .await
    }

    /// List objects whose key starts with `prefix`.
    ///
    /// Entries whose attributes or metadata cannot be read are skipped with
    /// a warning. Order follows traversal and is not sorted.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectSummary>> {
        self.ensure_bucket(bucket).await?;
        let keys = self.backend.list(&bucket_path(bucket), prefix).await?;

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            if let Err(err) = self.backend.stat(&object_path(bucket, &key)).await {
                warn!("skipping {}/{}: {}", bucket, key, err);
                continue;
            }
            match self.metadata.read(bucket, &key).await {
                Ok(metadata) => objects.push(ObjectSummary {
                    key,
                    last_modified: metadata.system.last_modified,
                    size: metadata.system.size,
                    etag: metadata.system.etag,
                }),
                Err(err) => warn!("skipping {}/{}: {}", bucket, key, err),
            }
        }
        Ok(objects)
    }
}

/// Drain `stream` into `dest`, hashing and counting as it goes.
///
/// On error the caller drops `dest`, which discards the staged bytes.
async fn ingest_stream(
    dest: &mut dyn StagedWrite,
    mut stream: ByteStream,
) -> StorageResult<(String, u64)> {
    let mut digest = Context::new();
    let mut size: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StorageError::StreamIngestion)?;
        digest.consume(&chunk);
        size += chunk.len() as u64;
        dest.write_chunk(&chunk).await?;
    }
    Ok((format!("{:x}", digest.compute()), size))
}
