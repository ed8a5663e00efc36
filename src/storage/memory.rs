//! In-memory storage backend.
//!
//! Files and directories are held in ordered maps behind a
//! `tokio::sync::RwLock`. Directory semantics mirror the filesystem backend:
//! writing a file creates its parents, deleting one leaves them in place
//! until pruned. Nothing survives a restart.

use super::backend::{FileStat, StagedWrite, StorageBackend, parent_path};
use crate::models::object::ObjectStream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, ErrorKind},
    sync::Arc,
};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct MemoryFile {
    data: Bytes,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
}

impl MemoryState {
    fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        let file_child = self
            .files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(&prefix));
        let dir_child = self
            .dirs
            .range(prefix.clone()..)
            .next()
            .is_some_and(|path| path.starts_with(&prefix));
        file_child || dir_child
    }

    /// Register every ancestor of `path` as a directory.
    fn add_parents(&mut self, path: &str) -> io::Result<()> {
        let mut parent = parent_path(path);
        while !parent.is_empty() {
            if self.files.contains_key(parent) {
                return Err(io::Error::new(
                    ErrorKind::NotADirectory,
                    format!("`{}` is a file", parent),
                ));
            }
            self.dirs.insert(parent.to_string());
            parent = parent_path(parent);
        }
        Ok(())
    }

    fn insert_file(&mut self, path: &str, data: Bytes) -> io::Result<()> {
        if self.dirs.contains(path) {
            return Err(io::Error::new(
                ErrorKind::IsADirectory,
                format!("`{}` is a directory", path),
            ));
        }
        self.add_parents(path)?;
        self.files.insert(
            path.to_string(),
            MemoryFile {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn ensure_dir(&self, dir: &str) -> io::Result<()> {
        if dir.is_empty() || self.dirs.contains(dir) {
            Ok(())
        } else {
            Err(not_found(dir))
        }
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("`{}` not found", path))
}

/// Normalize a backend path: drop empty segments, reject `.` and `..`.
fn normalize(path: &str) -> io::Result<String> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("path traversal detected in `{}`", path),
            ));
        }
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Keeps every file in process memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, path: &str) -> io::Result<Bytes> {
        let path = normalize(path)?;
        let state = self.state.read().await;
        state
            .files
            .get(&path)
            .map(|file| file.data.clone())
            .ok_or_else(|| not_found(&path))
    }

    async fn read_stream(&self, path: &str) -> io::Result<ObjectStream> {
        let data = self.read(path).await?;
        Ok(ObjectStream {
            size: data.len() as u64,
            stream: stream::once(async move { Ok(data) }).boxed(),
        })
    }

    async fn write(&self, path: &str, data: Bytes) -> io::Result<()> {
        let path = normalize(path)?;
        self.state.write().await.insert_file(&path, data)
    }

    async fn stage(&self, path: &str) -> io::Result<Box<dyn StagedWrite>> {
        Ok(Box::new(MemoryStagedWrite {
            state: self.state.clone(),
            path: normalize(path)?,
            buffer: Some(Vec::new()),
        }))
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        let path = normalize(path)?;
        let mut state = self.state.write().await;
        state
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| not_found(&path))
    }

    async fn stat(&self, path: &str) -> io::Result<FileStat> {
        let path = normalize(path)?;
        let state = self.state.read().await;
        if let Some(file) = state.files.get(&path) {
            return Ok(FileStat {
                size: file.data.len() as u64,
                modified: file.modified,
                is_dir: false,
            });
        }
        if path.is_empty() || state.dirs.contains(&path) {
            return Ok(FileStat {
                size: 0,
                modified: Utc::now(),
                is_dir: true,
            });
        }
        Err(not_found(&path))
    }

    async fn list(&self, dir: &str, prefix: Option<&str>) -> io::Result<Vec<String>> {
        let dir = normalize(dir)?;
        let state = self.state.read().await;
        state.ensure_dir(&dir)?;
        let prefix = prefix.unwrap_or("");
        Ok(state
            .files
            .keys()
            .filter(|path| is_within(path, &dir) && path.as_str() != dir)
            .map(|path| {
                if dir.is_empty() {
                    path.clone()
                } else {
                    path[dir.len() + 1..].to_string()
                }
            })
            .filter(|relative| relative.starts_with(prefix))
            .collect())
    }

    async fn list_dirs(&self, dir: &str) -> io::Result<Vec<String>> {
        let dir = normalize(dir)?;
        let state = self.state.read().await;
        state.ensure_dir(&dir)?;
        Ok(state
            .dirs
            .iter()
            .filter(|path| parent_path(path) == dir)
            .map(|path| path.rsplit('/').next().unwrap_or(path).to_string())
            .collect())
    }

    async fn create_dir(&self, dir: &str) -> io::Result<()> {
        let dir = normalize(dir)?;
        if dir.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        if state.files.contains_key(&dir) {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("`{}` is a file", dir),
            ));
        }
        state.add_parents(&dir)?;
        state.dirs.insert(dir);
        Ok(())
    }

    async fn remove_dir_all(&self, dir: &str) -> io::Result<()> {
        let dir = normalize(dir)?;
        let mut state = self.state.write().await;
        if dir.is_empty() {
            state.files.clear();
            state.dirs.clear();
            return Ok(());
        }
        if !state.dirs.contains(&dir) {
            return Err(not_found(&dir));
        }
        state.files.retain(|path, _| !is_within(path, &dir));
        state.dirs.retain(|path| !is_within(path, &dir));
        Ok(())
    }

    async fn prune_empty_dirs(&self, dir: &str, stop_at: &str) {
        let (Ok(dir), Ok(stop_at)) = (normalize(dir), normalize(stop_at)) else {
            return;
        };
        let mut state = self.state.write().await;
        let mut current = dir;
        while is_within(&current, &stop_at) && current != stop_at {
            if !state.dirs.contains(&current) || state.has_children(&current) {
                break;
            }
            state.dirs.remove(&current);
            current = parent_path(&current).to_string();
        }
    }
}

/// Buffers chunks until commit; dropping it discards the buffer.
struct MemoryStagedWrite {
    state: Arc<RwLock<MemoryState>>,
    path: String,
    buffer: Option<Vec<u8>>,
}

fn already_committed() -> io::Error {
    io::Error::new(ErrorKind::Other, "staged write already committed")
}

#[async_trait]
impl StagedWrite for MemoryStagedWrite {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let buffer = self.buffer.as_mut().ok_or_else(already_committed)?;
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(&mut self) -> io::Result<()> {
        let buffer = self.buffer.take().ok_or_else(already_committed)?;
        self.state
            .write()
            .await
            .insert_file(&self.path, Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_delete() {
        let backend = MemoryBackend::new();
        backend.write("b/a/x.txt", Bytes::from("x")).await.unwrap();
        assert_eq!(backend.read("b/a/x.txt").await.unwrap(), "x");
        assert!(backend.stat("b/a").await.unwrap().is_dir);

        backend.delete("b/a/x.txt").await.unwrap();
        assert_eq!(
            backend.read("b/a/x.txt").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            backend.delete("b/a/x.txt").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn staged_write_is_invisible_until_commit() {
        let backend = MemoryBackend::new();
        let mut staged = backend.stage("b/k").await.unwrap();
        staged.write_chunk(b"abc").await.unwrap();
        assert!(backend.read("b/k").await.is_err());

        staged.commit().await.unwrap();
        assert_eq!(backend.read("b/k").await.unwrap(), "abc");

        let mut dropped = backend.stage("b/other").await.unwrap();
        dropped.write_chunk(b"zzz").await.unwrap();
        drop(dropped);
        assert!(backend.read("b/other").await.is_err());
    }

    #[tokio::test]
    async fn lists_relative_to_dir() {
        let backend = MemoryBackend::new();
        backend.write("b/images/a.png", Bytes::from("1")).await.unwrap();
        backend.write("b/images/x/b.png", Bytes::from("2")).await.unwrap();
        backend.write("b/docs/c.md", Bytes::from("3")).await.unwrap();
        backend.write("bb/d.txt", Bytes::from("4")).await.unwrap();

        let listed = backend.list("b", Some("images/")).await.unwrap();
        assert_eq!(listed, vec!["images/a.png", "images/x/b.png"]);
        assert_eq!(backend.list("b", None).await.unwrap().len(), 3);
        assert_eq!(
            backend.list("missing", None).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert_eq!(backend.list_dirs("").await.unwrap(), vec!["b", "bb"]);
    }

    #[tokio::test]
    async fn prune_matches_filesystem_semantics() {
        let backend = MemoryBackend::new();
        backend.create_dir("b").await.unwrap();
        backend.write("b/x/y/z.txt", Bytes::from("z")).await.unwrap();
        backend.write("b/x/keep.txt", Bytes::from("k")).await.unwrap();
        backend.delete("b/x/y/z.txt").await.unwrap();

        backend.prune_empty_dirs("b/x/y", "b").await;
        assert!(backend.stat("b/x/y").await.is_err());
        assert!(backend.stat("b/x").await.unwrap().is_dir);

        backend.delete("b/x/keep.txt").await.unwrap();
        backend.prune_empty_dirs("b/x", "b").await;
        assert!(backend.stat("b/x").await.is_err());
        assert!(backend.stat("b").await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn remove_dir_all_drops_subtree() {
        let backend = MemoryBackend::new();
        backend.write("b/a/x", Bytes::from("x")).await.unwrap();
        backend.write("bc/y", Bytes::from("y")).await.unwrap();
        backend.remove_dir_all("b").await.unwrap();

        assert!(backend.stat("b").await.is_err());
        assert!(backend.stat("b/a/x").await.is_err());
        assert_eq!(backend.read("bc/y").await.unwrap(), "y");
    }
}
