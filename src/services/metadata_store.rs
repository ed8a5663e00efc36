//! Sidecar metadata records.
//!
//! Each object `{bucket}/{key}` has at most one JSON sidecar at
//! `.metadata/{bucket}/{key}.meta.json`, mirroring the key's path structure.
//! When the sidecar is missing, a record is synthesized from the content
//! file's raw attributes.

use super::storage_service::{StorageError, StorageResult};
use crate::{
    models::metadata::ObjectMetadata,
    storage::backend::{StagedWrite, StorageBackend, join_path, parent_path},
};
use bytes::Bytes;
use std::{io::ErrorKind, sync::Arc};
use tracing::debug;

/// Reserved directory below the storage root holding all sidecars.
pub const METADATA_DIRECTORY: &str = ".metadata";

/// Appended to the key path to form the sidecar path.
pub const METADATA_FILE_SUFFIX: &str = ".meta.json";

/// Backend path of a bucket's content directory.
pub fn bucket_path(bucket: &str) -> String {
    bucket.to_string()
}

/// Backend path of a bucket's metadata directory.
pub fn bucket_metadata_path(bucket: &str) -> String {
    join_path([METADATA_DIRECTORY, bucket])
}

/// Backend path of an object's content file.
pub fn object_path(bucket: &str, key: &str) -> String {
    join_path([bucket, key])
}

/// Backend path of an object's sidecar.
pub fn metadata_path(bucket: &str, key: &str) -> String {
    format!(
        "{}/{}{}",
        bucket_metadata_path(bucket),
        key,
        METADATA_FILE_SUFFIX
    )
}

/// Reads and writes sidecar records through a [`StorageBackend`].
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn StorageBackend>,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn encode(bucket: &str, key: &str, record: &ObjectMetadata) -> StorageResult<Vec<u8>> {
        serde_json::to_vec_pretty(record).map_err(|source| StorageError::Metadata {
            path: metadata_path(bucket, key),
            source,
        })
    }

    /// Serialize `record` and replace the object's sidecar with it.
    pub async fn write(&self, bucket: &str, key: &str, record: &ObjectMetadata) -> StorageResult<()> {
        let encoded = Self::encode(bucket, key, record)?;
        self.backend
            .write(&metadata_path(bucket, key), Bytes::from(encoded))
            .await?;
        Ok(())
    }

    /// Serialize `record` into a staged write; nothing is visible until the
    /// caller commits it.
    pub async fn stage(
        &self,
        bucket: &str,
        key: &str,
        record: &ObjectMetadata,
    ) -> StorageResult<Box<dyn StagedWrite>> {
        let encoded = Self::encode(bucket, key, record)?;
        let mut staged = self.backend.stage(&metadata_path(bucket, key)).await?;
        staged.write_chunk(&encoded).await?;
        Ok(staged)
    }

    /// Read the object's record, synthesizing one from the content file if
    /// no sidecar exists.
    ///
    /// Returns `ObjectNotFound` when neither sidecar nor content exist. Any
    /// other failure (permissions, unparseable sidecar) is returned as is.
    pub async fn read(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        let path = metadata_path(bucket, key);
        match self.backend.read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|source| StorageError::Metadata { path, source }),
            Err(err) if err.kind() == ErrorKind::NotFound => self.synthesize(bucket, key).await,
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn synthesize(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        let not_found = || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let stat = match self.backend.stat(&object_path(bucket, key)).await {
            Ok(stat) if stat.is_dir => return Err(not_found()),
            Ok(stat) => stat,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        debug!("no sidecar for {}/{}, synthesizing metadata", bucket, key);
        Ok(ObjectMetadata::synthesized(stat.size, stat.modified))
    }

    /// Remove the sidecar (absence tolerated) and prune metadata directories
    /// it leaves empty.
    pub async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = metadata_path(bucket, key);
        match self.backend.delete(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("sidecar {} already missing", path);
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
        self.backend
            .prune_empty_dirs(parent_path(&path), &bucket_metadata_path(bucket))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::metadata::{DEFAULT_CONTENT_TYPE, SystemMetadata, UserMetadata},
        storage::memory::MemoryBackend,
    };
    use chrono::Utc;
    use serde_json::json;

    fn store() -> (Arc<MemoryBackend>, MetadataStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = MetadataStore::new(backend.clone());
        (backend, store)
    }

    fn record(etag: &str) -> ObjectMetadata {
        let mut user = UserMetadata::new();
        user.insert("author".into(), json!("jane"));
        ObjectMetadata::new(
            SystemMetadata {
                content_type: "text/plain".into(),
                size: 3,
                last_modified: Utc::now(),
                etag: etag.into(),
            },
            user,
        )
    }

    #[test]
    fn paths_mirror_key_structure() {
        assert_eq!(
            metadata_path("photos", "2025/01/cat.png"),
            ".metadata/photos/2025/01/cat.png.meta.json"
        );
        assert_eq!(object_path("photos", "2025/01/cat.png"), "photos/2025/01/cat.png");
        assert_ne!(metadata_path("a-b", "c"), metadata_path("a", "b-c"));
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_backend, store) = store();
        let written = record("abc");
        store.write("bucket", "a/b.txt", &written).await.unwrap();

        let read = store.read("bucket", "a/b.txt").await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn missing_sidecar_is_synthesized_from_content() {
        let (backend, store) = store();
        backend
            .write("bucket/raw.bin", Bytes::from_static(b"12345"))
            .await
            .unwrap();

        let read = store.read("bucket", "raw.bin").await.unwrap();
        assert_eq!(read.system.size, 5);
        assert_eq!(read.system.content_type, DEFAULT_CONTENT_TYPE);
        assert!(read.etag_unknown());
    }

    #[tokio::test]
    async fn missing_everything_is_object_not_found() {
        let (_backend, store) = store();
        let err = store.read("bucket", "ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn corrupt_sidecar_is_an_error() {
        let (backend, store) = store();
        backend
            .write("bucket/k", Bytes::from_static(b"data"))
            .await
            .unwrap();
        backend
            .write(&metadata_path("bucket", "k"), Bytes::from_static(b"{\"systemMeta"))
            .await
            .unwrap();

        let err = store.read("bucket", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::Metadata { .. }));
    }

    #[tokio::test]
    async fn staged_record_appears_on_commit() {
        let (_backend, store) = store();
        let mut staged = store.stage("bucket", "k", &record("e")).await.unwrap();
        assert!(store.read("bucket", "k").await.is_err());
        staged.commit().await.unwrap();
        assert_eq!(store.read("bucket", "k").await.unwrap().system.etag, "e");
    }

    #[tokio::test]
    async fn delete_tolerates_missing_and_prunes() {
        let (backend, store) = store();
        backend.create_dir(&bucket_metadata_path("bucket")).await.unwrap();
        store.write("bucket", "x/y/z", &record("e")).await.unwrap();

        store.delete("bucket", "x/y/z").await.unwrap();
        store.delete("bucket", "x/y/z").await.unwrap();

        assert!(backend.stat(".metadata/bucket/x").await.is_err());
        assert!(backend.stat(".metadata/bucket").await.unwrap().is_dir);
    }
}
