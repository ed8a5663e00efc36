//! End-to-end behaviour of the storage engine on a real directory tree.

use bytes::Bytes;
use futures::stream;
use local_s3::{
    models::object::{ObjectBody, PutObjectOptions},
    services::{
        metadata_store::{METADATA_DIRECTORY, metadata_path},
        storage_service::{StorageError, StorageService},
    },
    storage::{local::LocalBackend, memory::MemoryBackend},
};
use std::{io, path::Path, sync::Arc};

async fn service_at(root: &Path) -> StorageService {
    let backend = LocalBackend::new(root).await.expect("failed to create backend");
    StorageService::new(Arc::new(backend))
}

async fn setup() -> (tempfile::TempDir, StorageService) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let service = service_at(dir.path()).await;
    service.create_bucket("media").await.unwrap();
    (dir, service)
}

async fn put(service: &StorageService, key: &str, content: &'static [u8]) {
    service
        .put_object("media", key, content.into(), PutObjectOptions::default())
        .await
        .unwrap();
}

fn chunked(content: &'static [u8], chunk: usize) -> ObjectBody {
    let chunks: Vec<io::Result<Bytes>> = content
        .chunks(chunk)
        .map(|c| Ok(Bytes::from_static(c)))
        .collect();
    ObjectBody::from_stream(stream::iter(chunks))
}

#[tokio::test]
async fn put_then_get_round_trips_content_and_etag() {
    let (dir, service) = setup().await;
    let content: &'static [u8] = b"the quick brown fox jumps over the lazy dog";

    let put = service
        .put_object("media", "a/b.txt", content.into(), PutObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(put.key, "a/b.txt");
    assert_eq!(put.bucket, "media");
    assert_eq!(put.size, content.len() as u64);
    assert_eq!(put.etag, format!("{:x}", md5::compute(content)));

    let object = service.get_object("media", "a/b.txt").await.unwrap();
    assert_eq!(object.body, Bytes::from_static(content));
    assert_eq!(object.metadata.system.etag, put.etag);

    assert!(dir.path().join("media/a/b.txt").is_file());
    assert!(
        dir.path()
            .join(METADATA_DIRECTORY)
            .join("media/a/b.txt.meta.json")
            .is_file()
    );
}

#[tokio::test]
async fn streamed_and_buffered_ingestion_agree() {
    let (_dir, service) = setup().await;
    let content: &'static [u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let buffered = service
        .put_object("media", "buffered", content.into(), PutObjectOptions::default())
        .await
        .unwrap();
    let streamed = service
        .put_object("media", "streamed", chunked(content, 7), PutObjectOptions::default())
        .await
        .unwrap();

    assert_eq!(buffered.etag, streamed.etag);
    assert_eq!(buffered.size, streamed.size);
    assert_eq!(
        service.get_object("media", "streamed").await.unwrap().body,
        Bytes::from_static(content)
    );
}

#[tokio::test]
async fn empty_object_has_md5_of_nothing() {
    let (_dir, service) = setup().await;
    let put = service
        .put_object("media", "empty", chunked(b"", 1), PutObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(put.size, 0);
    assert_eq!(put.etag, "d41d8cd98f00b204e9800998ecf8427e");
}

#[tokio::test]
async fn get_after_delete_is_object_not_found() {
    let (_dir, service) = setup().await;
    put(&service, "k.txt", b"bye").await;

    service.delete_object("media", "k.txt").await.unwrap();

    let err = service.get_object("media", "k.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn deleting_last_nested_object_prunes_directories() {
    let (dir, service) = setup().await;
    put(&service, "x/y/z.txt", b"z").await;

    service.delete_object("media", "x/y/z.txt").await.unwrap();

    let bucket = dir.path().join("media");
    assert!(!bucket.join("x/y").exists());
    assert!(!bucket.join("x").exists());
    assert!(bucket.is_dir());
    assert!(!dir.path().join(METADATA_DIRECTORY).join("media/x").exists());
    assert!(dir.path().join(METADATA_DIRECTORY).join("media").is_dir());
}

#[tokio::test]
async fn deleting_keeps_directories_with_siblings() {
    let (dir, service) = setup().await;
    put(&service, "x/y/z.txt", b"z").await;
    put(&service, "x/sibling.txt", b"s").await;

    service.delete_object("media", "x/y/z.txt").await.unwrap();

    assert!(!dir.path().join("media/x/y").exists());
    assert!(dir.path().join("media/x/sibling.txt").is_file());
}

#[tokio::test]
async fn list_objects_filters_by_prefix_at_any_depth() {
    let (_dir, service) = setup().await;
    put(&service, "images/cat.png", b"c").await;
    put(&service, "images/2025/01/dog.png", b"d").await;
    put(&service, "docs/images/readme.md", b"r").await;
    put(&service, "imagesque.txt", b"i").await;
    put(&service, "top.txt", b"t").await;

    let mut keys: Vec<String> = service
        .list_objects("media", Some("images/"))
        .await
        .unwrap()
        .into_iter()
        .map(|object| object.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["images/2025/01/dog.png", "images/cat.png"]);

    let all = service.list_objects("media", None).await.unwrap();
    assert_eq!(all.len(), 5);
    let top = all.iter().find(|object| object.key == "top.txt").unwrap();
    assert_eq!(top.size, 1);
    assert_eq!(top.etag, format!("{:x}", md5::compute(b"t")));
}

#[tokio::test]
async fn list_objects_of_missing_bucket_fails() {
    let (_dir, service) = setup().await;
    let err = service.list_objects("nothing-here", None).await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));
}

#[tokio::test]
async fn create_bucket_is_idempotent() {
    let (_dir, service) = setup().await;
    service.create_bucket("media").await.unwrap();

    let buckets = service.list_buckets().await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].name, "media");
}

#[tokio::test]
async fn delete_non_empty_bucket_changes_nothing() {
    let (_dir, service) = setup().await;
    put(&service, "keep/me.txt", b"still here").await;

    let err = service.delete_bucket("media").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotEmpty(name) if name == "media"));

    assert_eq!(service.list_buckets().await.unwrap().len(), 1);
    let object = service.get_object("media", "keep/me.txt").await.unwrap();
    assert_eq!(object.body, Bytes::from_static(b"still here"));
}

#[tokio::test]
async fn failed_stream_leaves_nothing_discoverable() {
    let (dir, service) = setup().await;
    let body = ObjectBody::from_stream(stream::iter(vec![
        Ok(Bytes::from_static(b"first chunk")),
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "upload aborted")),
    ]));

    let err = service
        .put_object("media", "broken/file.bin", body, PutObjectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StreamIngestion(_)));

    assert!(service.list_objects("media", None).await.unwrap().is_empty());
    assert!(!dir.path().join("media/broken/file.bin").exists());
    assert!(
        !dir.path()
            .join(METADATA_DIRECTORY)
            .join("media/broken/file.bin.meta.json")
            .exists()
    );
    let staged = std::fs::read_dir(dir.path().join(".staging")).unwrap().count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn missing_sidecar_is_synthesized() {
    let (dir, service) = setup().await;
    put(&service, "orphan.bin", b"12345").await;
    std::fs::remove_file(
        dir.path()
            .join(METADATA_DIRECTORY)
            .join("media/orphan.bin.meta.json"),
    )
    .unwrap();

    let metadata = service.get_object_metadata("media", "orphan.bin").await.unwrap();
    assert_eq!(metadata.system.size, 5);
    assert_eq!(metadata.system.content_type, "application/octet-stream");
    assert_eq!(metadata.system.etag, "");

    let listed = service.list_objects("media", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].etag, "");

    // an object written by hand, without the engine
    std::fs::write(dir.path().join("media/manual.txt"), b"hi").unwrap();
    let object = service.get_object("media", "manual.txt").await.unwrap();
    assert_eq!(object.body, Bytes::from_static(b"hi"));
    assert!(object.metadata.etag_unknown());
}

#[tokio::test]
async fn unreadable_sidecar_is_skipped_by_listing() {
    let (dir, service) = setup().await;
    put(&service, "good.txt", b"g").await;
    put(&service, "bad.txt", b"b").await;
    std::fs::write(
        dir.path().join(metadata_path("media", "bad.txt")),
        b"not json",
    )
    .unwrap();

    let listed = service.list_objects("media", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "good.txt");

    let err = service.get_object("media", "bad.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::Metadata { .. }));
}

#[tokio::test]
async fn keys_are_validated_on_every_call() {
    let (_dir, service) = setup().await;
    for key in ["", "../x", "a//b", "a\\b"] {
        let err = service.get_object("media", key).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidObjectKey { .. }), "{key}");
        let err = service.delete_object("media", key).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidObjectKey { .. }), "{key}");
    }
    let err = service.list_objects("../etc", None).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidBucketName { .. }));
}

#[tokio::test]
async fn data_survives_a_new_service_instance() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = service_at(dir.path()).await;
        service.create_bucket("media").await.unwrap();
        put(&service, "persist.txt", b"still").await;
    }

    let service = service_at(dir.path()).await;
    let names: Vec<String> = service
        .list_buckets()
        .await
        .unwrap()
        .into_iter()
        .map(|bucket| bucket.name)
        .collect();
    assert_eq!(names, vec!["media"]);
    let object = service.get_object("media", "persist.txt").await.unwrap();
    assert_eq!(object.body, Bytes::from_static(b"still"));
}

#[tokio::test]
async fn memory_backend_behaves_like_the_filesystem() {
    let service = StorageService::new(Arc::new(MemoryBackend::new()));
    service.create_bucket("media").await.unwrap();
    put(&service, "x/y/z.txt", b"z").await;
    put(&service, "images/a.png", b"a").await;

    let listed = service.list_objects("media", Some("images/")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "images/a.png");

    let err = service.delete_bucket("media").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotEmpty(_)));

    service.delete_object("media", "x/y/z.txt").await.unwrap();
    service.delete_object("media", "images/a.png").await.unwrap();
    service.delete_bucket("media").await.unwrap();
    assert!(service.list_buckets().await.unwrap().is_empty());
}
