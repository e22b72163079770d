//! Version-control capability consumed by the checkpoint core.
//!
//! The core never touches history directly: it opens a [`TrackedTree`],
//! stages paths, commits and reads history through [`VersionControl`].
//! [`ObjectVcs`] is the embedded implementation; any other engine that can
//! satisfy the trait (a git subprocess, libgit2) plugs in the same way.

mod diff;
mod object_vcs;
mod tree;

pub use object_vcs::ObjectVcs;
pub use tree::{Tree, TreeEntry, TreeEntryKind};
pub(crate) use tree::CommitRecord;

use crate::error::Result;
use crate::lock::Deadline;
use crate::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend-neutral commit identity (hex digest as reported by the backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<ObjectId> for CommitId {
    fn from(id: ObjectId) -> Self {
        Self(id.as_hex())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A working tree registered with a backend.
#[derive(Debug, Clone)]
pub struct TrackedTree {
    root: PathBuf,
}

impl TrackedTree {
    /// Wraps a tree root; backends call this from `open` and `open_or_init`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the working tree.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// What to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staging {
    /// Every file in the tree, honoring ignore rules; removed files are staged as deletions.
    All,
    /// Only these paths, relative to the tree root.
    Paths(Vec<PathBuf>),
}

/// Aggregate change statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStat {
    /// Files added, removed or modified.
    pub files: usize,
    /// Lines added across text files.
    pub insertions: usize,
    /// Lines removed across text files.
    pub deletions: usize,
}

impl DiffStat {
    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.files == 0
    }
}

/// A commit as reported in history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full commit hash.
    pub hash: CommitId,
    /// Abbreviated hash (8 chars).
    pub short_hash: String,
    /// Commit message.
    pub message: String,
    /// `Name <email>` of the author.
    pub author: String,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Changes relative to the first parent.
    pub stats: DiffStat,
}

/// Result of a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit was written.
    Created(CommitInfo),
    /// Nothing was staged relative to HEAD; carries the unchanged HEAD.
    NoChanges(CommitId),
}

/// Report from sweeping unreachable backend objects.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectGcReport {
    /// Objects examined.
    pub objects_scanned: usize,
    /// Objects reachable from HEAD or the staged tree.
    pub objects_reachable: usize,
    /// Objects deleted (or that would be, in a dry run).
    pub objects_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

/// Version-control primitives the checkpoint core depends on.
pub trait VersionControl: Send + Sync {
    /// Directory name holding backend internals inside a tracked tree.
    ///
    /// Snapshots exclude it and restores carry it across the swap.
    fn internal_dir(&self) -> &'static str;

    /// Opens an existing tracked tree at `path` without writing anything.
    ///
    /// Fails with `CorruptState` when the tree has no readable history.
    fn open(&self, path: &Path) -> Result<TrackedTree>;

    /// Opens the tracked tree at `path`, initializing bookkeeping if absent.
    ///
    /// Only repository creation uses this; every other path goes through `open`.
    fn open_or_init(&self, path: &Path) -> Result<TrackedTree>;

    /// Stages paths for the next commit, giving up once `deadline` passes.
    ///
    /// Paths excluded by ignore rules are never staged.
    fn stage(&self, tree: &TrackedTree, staging: &Staging, deadline: &Deadline) -> Result<()>;

    /// Differences between the staged state and HEAD.
    fn staged_changes(&self, tree: &TrackedTree) -> Result<DiffStat>;

    /// Commits the staged state. Never creates an empty commit.
    ///
    /// An expired `deadline` discards the stage and writes nothing.
    fn commit(
        &self,
        tree: &TrackedTree,
        message: &str,
        author: &str,
        deadline: &Deadline,
    ) -> Result<CommitOutcome>;

    /// Identity of the current HEAD commit.
    fn head_commit(&self, tree: &TrackedTree) -> Result<CommitId>;

    /// Details of a single commit.
    fn commit_info(&self, tree: &TrackedTree, id: &CommitId) -> Result<CommitInfo>;

    /// First-parent history from HEAD, newest first.
    fn commit_history(&self, tree: &TrackedTree, limit: usize, skip: usize)
        -> Result<Vec<CommitInfo>>;

    /// Number of commits reachable from HEAD along first parents.
    fn commit_count(&self, tree: &TrackedTree) -> Result<usize>;

    /// Changes introduced by `commit` relative to its first parent.
    fn diff_stat(&self, tree: &TrackedTree, commit: &CommitId) -> Result<DiffStat>;

    /// Removes unreachable backend objects older than `grace`.
    ///
    /// Backends that manage their own storage keep the default no-op.
    fn collect_garbage(
        &self,
        _tree: &TrackedTree,
        _grace: Duration,
        _dry_run: bool,
    ) -> Result<ObjectGcReport> {
        Ok(ObjectGcReport::default())
    }
}
