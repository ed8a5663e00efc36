//! Abstract storage backend trait.
//!
//! The engine never touches the filesystem directly: every read, write,
//! listing and directory operation goes through [`StorageBackend`]. Paths
//! are backend-relative and `/`-separated (e.g. `photos/2025/img.jpg` or
//! `.metadata/photos/2025/img.jpg.meta.json`).

use crate::models::object::ObjectStream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;

/// Raw attributes of a stored file or directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// An uncommitted write.
///
/// Bytes written here are invisible at the destination path until
/// [`commit`](StagedWrite::commit) succeeds. Dropping an uncommitted staged
/// write discards everything written so far.
#[async_trait]
pub trait StagedWrite: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Publish the staged bytes at the destination, replacing any previous
    /// file there. Parent directories are created as needed.
    async fn commit(&mut self) -> io::Result<()>;
}

/// Storage capability contract shared by the filesystem and in-memory backends.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Read a whole file.
    async fn read(&self, path: &str) -> io::Result<Bytes>;

    /// Open a file for streamed reading, along with its current length.
    async fn read_stream(&self, path: &str) -> io::Result<ObjectStream>;

    /// Replace the file at `path` with `data`, creating parent directories.
    async fn write(&self, path: &str, data: Bytes) -> io::Result<()>;

    /// Begin a staged write destined for `path`.
    async fn stage(&self, path: &str) -> io::Result<Box<dyn StagedWrite>>;

    /// Delete a file. A missing file, or a directory at `path`, is reported
    /// as `NotFound`.
    async fn delete(&self, path: &str) -> io::Result<()>;

    async fn stat(&self, path: &str) -> io::Result<FileStat>;

    /// Recursively list files under `dir`, returning paths relative to `dir`.
    /// With a `prefix`, only relative paths starting with it are returned.
    async fn list(&self, dir: &str, prefix: Option<&str>) -> io::Result<Vec<String>>;

    /// Names of the immediate subdirectories of `dir`.
    async fn list_dirs(&self, dir: &str) -> io::Result<Vec<String>>;

    /// Create `dir` and any missing parents. Succeeds if it already exists.
    async fn create_dir(&self, dir: &str) -> io::Result<()>;

    /// Remove `dir` and everything below it. A missing directory is `NotFound`.
    async fn remove_dir_all(&self, dir: &str) -> io::Result<()>;

    /// Remove `dir` and its ancestors while they are empty, never touching
    /// `stop_at` or anything outside it. Failures end the walk silently.
    async fn prune_empty_dirs(&self, dir: &str, stop_at: &str);
}

/// Join backend-relative path segments with `/`, skipping empty ones.
pub fn join_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a backend-relative path; the empty string is the root.
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
