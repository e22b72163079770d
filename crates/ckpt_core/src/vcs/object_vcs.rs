//! Embedded content-addressed backend.
//!
//! Each tracked tree keeps its history in `<tree>/.ckpt/`:
//!
//! ```text
//! .ckpt/objects/{shard}/{hex}   zstd-compressed blobs, trees and commits
//! .ckpt/HEAD                    current commit
//! .ckpt/refs/main               branch tip (always equal to HEAD)
//! .ckpt/STAGE                   staged root tree, absent when nothing is staged
//! ```
//!
//! A freshly initialized tree has no HEAD until its first commit.

use super::diff::diff_maps;
use super::tree::{
    build as build_tree, flatten as flatten_tree, insert_file, path_key, remove_prefix, PathMap,
    WorktreeScanner,
};
use super::{
    CommitId, CommitInfo, CommitOutcome, CommitRecord, DiffStat, ObjectGcReport, Staging,
    TrackedTree, VersionControl,
};
use crate::error::{CkptError, Result};
use crate::lock::Deadline;
use crate::refs::{Refs, MAIN_REF};
use crate::{ObjectId, ObjectStore};
use chrono::{TimeZone, Utc};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const INTERNAL_DIR: &str = ".ckpt";

/// [`VersionControl`] backed by an in-tree object store.
#[derive(Debug, Clone)]
pub struct ObjectVcs {
    compression_level: i32,
}

impl Default for ObjectVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectVcs {
    /// Creates a backend with the default zstd level.
    pub fn new() -> Self {
        Self::with_compression(3)
    }

    /// Creates a backend with an explicit zstd level.
    pub fn with_compression(compression_level: i32) -> Self {
        Self { compression_level }
    }

    fn backend(&self, tree: &TrackedTree) -> Backend {
        let internal = tree.root().join(INTERNAL_DIR);
        Backend {
            root: tree.root().to_path_buf(),
            store: ObjectStore::with_compression(internal.join("objects"), self.compression_level),
            refs: Refs::new(&internal),
        }
    }
}

/// Per-tree view over the object store and refs.
struct Backend {
    root: PathBuf,
    store: ObjectStore,
    refs: Refs,
}

impl Backend {
    fn head(&self) -> Result<Option<ObjectId>> {
        match self.refs.read_head() {
            Ok(id) => Ok(Some(id)),
            Err(CkptError::VersionControl(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn require_head(&self) -> Result<ObjectId> {
        self.head()?
            .ok_or_else(|| CkptError::VersionControl("no commits yet".to_string()))
    }

    fn head_files(&self) -> Result<PathMap> {
        match self.head()? {
            Some(head) => self.commit_files(head),
            None => Ok(PathMap::new()),
        }
    }

    fn commit_files(&self, id: ObjectId) -> Result<PathMap> {
        let commit = self.store.get_commit(id)?;
        flatten_tree(&self.store, commit.root_tree)
    }

    /// Staged files, falling back to HEAD when nothing is staged.
    fn staged_files(&self) -> Result<PathMap> {
        match self.refs.read_stage()? {
            Some(stage) => flatten_tree(&self.store, stage),
            None => self.head_files(),
        }
    }

    fn parent_files(&self, commit: &CommitRecord) -> Result<PathMap> {
        match commit.parents.first() {
            Some(parent) => self.commit_files(*parent),
            None => Ok(PathMap::new()),
        }
    }

    fn info(&self, id: ObjectId) -> Result<CommitInfo> {
        let commit = self.store.get_commit(id)?;
        let before = self.parent_files(&commit)?;
        let after = flatten_tree(&self.store, commit.root_tree)?;
        let stats = diff_maps(&self.store, &before, &after)?;
        Ok(to_info(id, &commit, stats))
    }

    /// Walks first parents from HEAD, newest first.
    fn first_parent_chain(&self) -> Result<Vec<(ObjectId, CommitRecord)>> {
        let mut chain = Vec::new();
        let mut next = self.head()?;
        while let Some(id) = next {
            let commit = self.store.get_commit(id)?;
            next = commit.parents.first().copied();
            chain.push((id, commit));
        }
        Ok(chain)
    }
}

fn to_info(id: ObjectId, commit: &CommitRecord, stats: DiffStat) -> CommitInfo {
    CommitInfo {
        hash: CommitId::from(id),
        short_hash: id.short(),
        message: commit.message.clone(),
        author: commit.author.clone(),
        timestamp: Utc
            .timestamp_millis_opt(commit.timestamp_millis)
            .single()
            .unwrap_or_default(),
        stats,
    }
}

fn not_a_directory(path: &Path) -> CkptError {
    CkptError::VersionControl(format!("not a directory: {}", path.display()))
}

fn parse_commit_id(id: &CommitId) -> Result<ObjectId> {
    ObjectId::from_hex(id.as_str())
        .map_err(|_| CkptError::VersionControl(format!("unknown commit: {}", id)))
}

impl VersionControl for ObjectVcs {
    fn internal_dir(&self) -> &'static str {
        INTERNAL_DIR
    }

    fn open(&self, path: &Path) -> Result<TrackedTree> {
        if !path.is_dir() {
            return Err(not_a_directory(path));
        }

        let tracked = TrackedTree::new(path);
        let backend = self.backend(&tracked);
        let corrupt = |reason: String| CkptError::CorruptState {
            path: path.join(INTERNAL_DIR),
            reason,
        };

        let head = backend
            .head()
            .map_err(|e| corrupt(format!("HEAD is unreadable: {}", e)))?
            .ok_or_else(|| corrupt("tracked tree has no history".to_string()))?;
        backend
            .store
            .get_commit(head)
            .map_err(|e| corrupt(format!("HEAD {} is unreadable: {}", head.short(), e)))?;

        Ok(tracked)
    }

    fn open_or_init(&self, path: &Path) -> Result<TrackedTree> {
        if !path.is_dir() {
            return Err(not_a_directory(path));
        }

        let tracked = TrackedTree::new(path);
        let backend = self.backend(&tracked);

        if let Some(head) = backend.head()? {
            backend.store.get_commit(head).map_err(|e| {
                CkptError::VersionControl(format!("HEAD {} is unreadable: {}", head.short(), e))
            })?;
        } else {
            fs::create_dir_all(backend.store.root())?;
            debug!(path = %path.display(), "Initialized tracked tree");
        }

        Ok(tracked)
    }

    fn stage(&self, tree: &TrackedTree, staging: &Staging, deadline: &Deadline) -> Result<()> {
        let backend = self.backend(tree);
        let scanner = WorktreeScanner::new(&backend.root, INTERNAL_DIR)?;

        let files = match staging {
            Staging::All => scanner.scan(Path::new(""), &backend.store, deadline)?,
            Staging::Paths(paths) => {
                let mut files = backend.staged_files()?;
                for path in paths {
                    deadline.check("staging")?;
                    let relative = path.strip_prefix(&backend.root).unwrap_or(path.as_path());
                    let Some(key) = path_key(relative) else {
                        debug!(path = %path.display(), "Skipping path outside tree");
                        continue;
                    };
                    if scanner.is_internal(&key) {
                        continue;
                    }

                    let full = backend.root.join(&key);
                    if scanner.is_ignored(&key, full.is_dir()) {
                        debug!(path = %key, "Skipping ignored path");
                        continue;
                    }
                    if full.is_file() {
                        let data = fs::read(&full)?;
                        insert_file(&mut files, &key, backend.store.put_blob(&data)?);
                    } else if full.is_dir() {
                        remove_prefix(&mut files, &key);
                        for (sub, id) in scanner.scan(Path::new(&key), &backend.store, deadline)? {
                            insert_file(&mut files, &sub, id);
                        }
                    } else {
                        remove_prefix(&mut files, &key);
                    }
                }
                files
            }
        };

        let staged = build_tree(&backend.store, &files)?;
        backend.refs.write_stage(staged)?;
        debug!(files = files.len(), "Staged tree");
        Ok(())
    }

    fn staged_changes(&self, tree: &TrackedTree) -> Result<DiffStat> {
        let backend = self.backend(tree);
        let before = backend.head_files()?;
        let after = backend.staged_files()?;
        diff_maps(&backend.store, &before, &after)
    }

    fn commit(
        &self,
        tree: &TrackedTree,
        message: &str,
        author: &str,
        deadline: &Deadline,
    ) -> Result<CommitOutcome> {
        let backend = self.backend(tree);
        let head = backend.head()?;

        let Some(staged) = backend.refs.read_stage()? else {
            let head = head.ok_or_else(|| CkptError::VersionControl("nothing to commit".into()))?;
            return Ok(CommitOutcome::NoChanges(head.into()));
        };

        let before = backend.head_files()?;
        let after = flatten_tree(&backend.store, staged)?;
        let stats = diff_maps(&backend.store, &before, &after)?;

        if stats.is_empty() {
            backend.refs.clear_stage()?;
            return match head {
                Some(head) => Ok(CommitOutcome::NoChanges(head.into())),
                None => Err(CkptError::VersionControl("nothing to commit".into())),
            };
        }

        if let Err(e) = deadline.check("commit") {
            backend.refs.clear_stage()?;
            return Err(e);
        }

        let record = CommitRecord {
            parents: head.into_iter().collect(),
            timestamp_millis: Utc::now().timestamp_millis(),
            message: message.to_string(),
            author: author.to_string(),
            root_tree: staged,
        };
        let id = backend.store.put_commit(&record)?;
        backend.refs.advance_head(id)?;
        backend.refs.clear_stage()?;

        Ok(CommitOutcome::Created(to_info(id, &record, stats)))
    }

    fn head_commit(&self, tree: &TrackedTree) -> Result<CommitId> {
        self.backend(tree).require_head().map(CommitId::from)
    }

    fn commit_info(&self, tree: &TrackedTree, id: &CommitId) -> Result<CommitInfo> {
        self.backend(tree).info(parse_commit_id(id)?)
    }

    fn commit_history(
        &self,
        tree: &TrackedTree,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<CommitInfo>> {
        let backend = self.backend(tree);
        let mut history = Vec::new();
        let mut next = backend.head()?;
        let mut position = 0;

        while let Some(id) = next {
            if history.len() >= limit {
                break;
            }
            let commit = backend.store.get_commit(id)?;
            next = commit.parents.first().copied();
            if position >= skip {
                let before = backend.parent_files(&commit)?;
                let after = flatten_tree(&backend.store, commit.root_tree)?;
                let stats = diff_maps(&backend.store, &before, &after)?;
                history.push(to_info(id, &commit, stats));
            }
            position += 1;
        }

        Ok(history)
    }

    fn commit_count(&self, tree: &TrackedTree) -> Result<usize> {
        Ok(self.backend(tree).first_parent_chain()?.len())
    }

    fn diff_stat(&self, tree: &TrackedTree, commit: &CommitId) -> Result<DiffStat> {
        Ok(self.backend(tree).info(parse_commit_id(commit)?)?.stats)
    }

    fn collect_garbage(
        &self,
        tree: &TrackedTree,
        grace: Duration,
        dry_run: bool,
    ) -> Result<ObjectGcReport> {
        let backend = self.backend(tree);
        let mut report = ObjectGcReport::default();

        let mut roots = Vec::new();
        roots.extend(backend.head()?);
        roots.extend(backend.refs.read_ref(MAIN_REF)?);
        let stage = backend.refs.read_stage()?;

        let reachable = mark_reachable(&backend.store, &roots, stage)?;
        report.objects_reachable = reachable.len();

        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let objects = backend.store.list_all_objects()?;
        report.objects_scanned = objects.len();

        for (id, size, mtime) in objects {
            if reachable.contains(&id) || mtime > cutoff {
                continue;
            }
            if !dry_run {
                if let Err(e) = backend.store.delete(id) {
                    warn!(object = %id.short(), error = %e, "Failed to delete object");
                    continue;
                }
            }
            report.objects_deleted += 1;
            report.bytes_freed += size;
        }

        Ok(report)
    }
}

/// Marks every object reachable from the given commits and staged tree.
fn mark_reachable(
    store: &ObjectStore,
    commits: &[ObjectId],
    stage: Option<ObjectId>,
) -> Result<HashSet<ObjectId>> {
    let mut reachable = HashSet::new();
    let mut trees = VecDeque::new();
    let mut pending = VecDeque::from_iter(commits.iter().copied());

    while let Some(id) = pending.pop_front() {
        if !reachable.insert(id) {
            continue;
        }
        let commit = store.get_commit(id)?;
        pending.extend(commit.parents.iter().copied());
        trees.push_back(commit.root_tree);
    }

    trees.extend(stage);
    while let Some(id) = trees.pop_front() {
        if !reachable.insert(id) {
            continue;
        }
        for entry in store.get_tree(id)?.entries {
            match entry.kind {
                super::TreeEntryKind::Blob => {
                    reachable.insert(entry.id);
                }
                super::TreeEntryKind::Tree => trees.push_back(entry.id),
            }
        }
    }

    Ok(reachable)
}
