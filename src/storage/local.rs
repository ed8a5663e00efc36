//! Local filesystem storage backend.
//!
//! Backend paths map directly onto files below a root directory. Every
//! write goes to a uniquely named file under `root/.staging` first and is
//! published by a rename, so readers and listings never observe a partially
//! written file.

use super::{
    backend::{FileStat, StagedWrite, StorageBackend},
    traversal::{cleanup_empty_directories, list_files_recursively, relative_key},
};
use crate::models::object::ObjectStream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Directory below the root that holds uncommitted writes.
pub const STAGING_DIRECTORY: &str = ".staging";

/// Stores files on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    /// Root directory for all stored files.
    root: PathBuf,

    /// Where staged writes live until committed. Same filesystem as `root`
    /// so commits are plain renames.
    staging: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`, creating the directory (and the
    /// staging directory) if missing.
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIRECTORY);
        fs::create_dir_all(&staging).await?;
        Ok(Self { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a backend path to an absolute file path.
    ///
    /// Rejects `.` and `..` segments so that a path can never escape `root`.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("path traversal detected in `{}`", path),
                ));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    fn temp_path(&self) -> PathBuf {
        self.staging.join(format!("tmp-{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn read(&self, path: &str) -> io::Result<Bytes> {
        let data = fs::read(self.resolve(path)?).await?;
        Ok(Bytes::from(data))
    }

    async fn read_stream(&self, path: &str) -> io::Result<ObjectStream> {
        let file = File::open(self.resolve(path)?).await?;
        let meta = file.metadata().await?;
        if meta.is_dir() {
            return Err(not_a_file(path));
        }
        Ok(ObjectStream {
            size: meta.len(),
            stream: ReaderStream::new(file).boxed(),
        })
    }

    async fn write(&self, path: &str, data: Bytes) -> io::Result<()> {
        let mut staged = self.stage(path).await?;
        staged.write_chunk(&data).await?;
        staged.commit().await
    }

    async fn stage(&self, path: &str) -> io::Result<Box<dyn StagedWrite>> {
        let final_path = self.resolve(path)?;
        let tmp_path = self.temp_path();
        let file = match File::create(&tmp_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // staging directory removed underneath us
                fs::create_dir_all(&self.staging).await?;
                File::create(&tmp_path).await?
            }
            Err(err) => return Err(err),
        };
        debug!("staging {} at {}", final_path.display(), tmp_path.display());
        Ok(Box::new(LocalStagedWrite {
            file: Some(file),
            tmp_path,
            final_path,
            committed: false,
        }))
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        let resolved = self.resolve(path)?;
        // remove_file on a directory fails with a platform-specific kind
        if fs::metadata(&resolved).await?.is_dir() {
            return Err(not_a_file(path));
        }
        fs::remove_file(resolved).await
    }

    async fn stat(&self, path: &str) -> io::Result<FileStat> {
        let meta = fs::metadata(self.resolve(path)?).await?;
        let modified = meta.modified().map(DateTime::<Utc>::from)?;
        Ok(FileStat {
            size: meta.len(),
            modified,
            is_dir: meta.is_dir(),
        })
    }

    async fn list(&self, dir: &str, prefix: Option<&str>) -> io::Result<Vec<String>> {
        let base = self.resolve(dir)?;
        let files = list_files_recursively(&base, prefix).await?;
        Ok(files
            .iter()
            .filter_map(|path| relative_key(&base, path))
            .collect())
    }

    async fn list_dirs(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut entries = fs::read_dir(self.resolve(dir)?).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!("ignoring non UTF-8 directory name {:?}", raw),
            }
        }
        Ok(names)
    }

    async fn create_dir(&self, dir: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(dir)?).await
    }

    async fn remove_dir_all(&self, dir: &str) -> io::Result<()> {
        fs::remove_dir_all(self.resolve(dir)?).await
    }

    async fn prune_empty_dirs(&self, dir: &str, stop_at: &str) {
        match (self.resolve(dir), self.resolve(stop_at)) {
            (Ok(dir), Ok(stop_at)) => cleanup_empty_directories(&dir, &stop_at).await,
            _ => debug!("refusing to prune {} up to {}", dir, stop_at),
        }
    }
}

fn not_a_file(path: &str) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("`{}` is a directory", path))
}

/// A file under the staging directory, renamed into place on commit and
/// removed on drop otherwise.
struct LocalStagedWrite {
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

fn already_committed() -> io::Error {
    io::Error::new(ErrorKind::Other, "staged write already committed")
}

#[async_trait]
impl StagedWrite for LocalStagedWrite {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(already_committed)?;
        file.write_all(chunk).await
    }

    async fn commit(&mut self) -> io::Result<()> {
        let mut file = self.file.take().ok_or_else(already_committed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(parent) = self.final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(err) = fs::rename(&self.tmp_path, &self.final_path).await {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(err);
            }
            fs::remove_file(&self.final_path).await?;
            fs::rename(&self.tmp_path, &self.final_path).await?;
        }
        self.committed = true;
        debug!("committed {}", self.final_path.display());
        Ok(())
    }
}

impl Drop for LocalStagedWrite {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.tmp_path) {
            Ok(_) => debug!(
                "discarded uncommitted write for {}",
                self.final_path.display()
            ),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!(
                "failed to remove staged file {}: {}",
                self.tmp_path.display(),
                err
            ),
        }
    }
}
