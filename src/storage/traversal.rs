//! Directory traversal helpers for the filesystem backend.
//!
//! - recursive file listing with key-prefix filtering
//! - upward reclamation of directories emptied by deletes

use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};

/// Recursively collect the files below `root`.
///
/// When `prefix` is given, only files whose `root`-relative `/`-joined path
/// starts with it are returned. Subdirectories that cannot be read are
/// skipped with a warning; only a failure to read `root` itself is an error.
/// The order of the result is traversal order.
pub async fn list_files_recursively(root: &Path, prefix: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let prefix = prefix.filter(|p| !p.is_empty());
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if dir == root => return Err(err),
            Err(err) => {
                warn!("skipping unreadable directory {}: {}", dir.display(), err);
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!("stopped reading directory {}: {}", dir.display(), err);
                    break;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!("skipping {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let keep = match prefix {
                None => true,
                Some(prefix) => relative_key(root, &path)
                    .map(|key| key.starts_with(prefix))
                    .unwrap_or(false),
            };
            if keep {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// The `/`-joined path of `path` relative to `root`, or `None` when `path`
/// is not below `root` or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Remove `dir` and then each parent while it is empty.
///
/// Stops when:
/// - directory not empty
/// - directory not found
/// - reached `stop_at`, or left its subtree
/// - encountered unexpected I/O errors
pub async fn cleanup_empty_directories(dir: &Path, stop_at: &Path) {
    let mut current = dir.to_path_buf();
    while current.starts_with(stop_at) && current != stop_at {
        match fs::remove_dir(&current).await {
            Ok(_) => {
                debug!("removed empty directory {}", current.display());
                match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}
