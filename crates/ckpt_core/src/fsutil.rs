//! Filesystem helpers: atomic JSON records, tree copies and id validation.

use crate::error::{CkptError, Result};
use crate::lock::Deadline;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Longest accepted owner or project id.
pub const MAX_ID_LEN: usize = 128;

/// Checks an owner or project id before it becomes a path component.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(CkptError::InvalidArgument(format!("{} is required", kind)));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CkptError::InvalidArgument(format!(
            "{} longer than {} characters",
            kind, MAX_ID_LEN
        )));
    }
    if id.starts_with('.') {
        return Err(CkptError::InvalidArgument(format!(
            "{} '{}' must not start with '.'",
            kind, id
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(CkptError::InvalidArgument(format!(
            "{} '{}' contains invalid characters",
            kind, id
        )));
    }
    Ok(())
}

/// Serializes `value` as pretty JSON and replaces `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data =
        serde_json::to_vec_pretty(value).map_err(|e| CkptError::Serialization(e.to_string()))?;
    atomic_write(path, &data)
}

/// Reads a JSON record. Parse failures become `InvalidMetadata`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| CkptError::InvalidMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Writes data atomically using temp file + fsync + rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    sync_dir(parent);
    Ok(())
}

/// fsyncs a directory so a rename inside it is durable (Unix only).
pub fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Totals gathered while copying a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files and symlinks copied.
    pub files: u64,
    /// Bytes of regular file content copied.
    pub bytes: u64,
}

/// Copies `src` into `dst`, skipping the top-level directory named `exclude`.
///
/// `dst` must not exist yet. The deadline is checked before every entry.
/// Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &str, deadline: &Deadline) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(dst)?;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_top_level(src, entry.path(), exclude));

    for entry in walker {
        deadline.check("tree copy")?;
        let entry = entry.map_err(io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&out)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &out)?;
            stats.files += 1;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(entry.path(), &out)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

/// Counts what [`copy_tree`] would copy, without copying.
pub fn count_tree(root: &Path, exclude: &str) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_top_level(root, entry.path(), exclude));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            stats.files += 1;
        } else if file_type.is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(stats)
}

/// BLAKE3 digest over every path and file body under `root`, in path order.
///
/// Two trees with the same fingerprint hold the same files with the same
/// contents. The top-level `exclude` directory is ignored.
pub fn tree_fingerprint(root: &Path, exclude: &str) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_top_level(root, entry.path(), exclude));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        if file_type.is_symlink() {
            hasher.update(fs::read_link(entry.path())?.to_string_lossy().as_bytes());
        } else {
            hasher.update(&fs::read(entry.path())?);
        }
        hasher.update(&[0]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Removes a directory tree, logging instead of failing.
pub fn remove_dir_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove directory");
    }
}

fn is_top_level(root: &Path, path: &Path, name: &str) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(|relative| relative.components().next())
        .is_some_and(|first| first.as_os_str() == name)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}
