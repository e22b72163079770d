//! Commit coordination: staging policy, no-op detection and history.

use crate::error::Result;
use crate::lock::Deadline;
use crate::metadata::LastCommit;
use crate::repository::RepositoryHandle;
use crate::service::Checkpointer;
use crate::vcs::{CommitInfo, CommitOutcome, DiffStat, Staging, TrackedTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Message used when the caller gives none.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Auto-commit: Save progress";

/// Page size used when the caller gives none.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Outcome of a commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// False when nothing differed from HEAD and no commit was made.
    pub changed: bool,
    /// New commit, or the unchanged HEAD.
    pub hash: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub files_changed: usize,
    pub stats: DiffStat,
}

impl CommitResult {
    fn from_info(info: CommitInfo, changed: bool) -> Self {
        Self {
            changed,
            hash: info.hash.to_string(),
            message: info.message,
            timestamp: info.timestamp,
            author: info.author,
            files_changed: if changed { info.stats.files } else { 0 },
            stats: if changed { info.stats } else { DiffStat::default() },
        }
    }
}

/// One page of first-parent history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitHistory {
    /// Newest first.
    pub commits: Vec<CommitInfo>,
    /// Commits reachable from HEAD.
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
}

impl Checkpointer {
    /// Stages and commits the working tree.
    ///
    /// With `files`, only those paths are staged; entries that do not exist,
    /// escape the tree or point into version-control internals are skipped.
    /// Without, the whole tree is staged honoring `.gitignore`. An unchanged
    /// tree yields `changed == false` and the current HEAD. Staging and the
    /// commit itself are bounded by `limits.operation_timeout_secs`.
    pub fn commit(
        &self,
        handle: &mut RepositoryHandle,
        message: &str,
        files: Option<&[PathBuf]>,
    ) -> Result<CommitResult> {
        let tracked = handle.tracked_tree(self.vcs())?;
        let _lock = self.lock(handle)?;
        let deadline = self.deadline(None);

        let staging = match files {
            Some(files) => Staging::Paths(self.existing_paths(&handle.tree_root(), files)),
            None => Staging::All,
        };
        let message = match message.trim() {
            "" => DEFAULT_COMMIT_MESSAGE,
            _ => message,
        };

        self.commit_locked(handle, &tracked, message, &staging, &deadline)
    }

    /// Commit body shared with checkpoint creation and restore. The caller
    /// holds the repository lock.
    pub(crate) fn commit_locked(
        &self,
        handle: &mut RepositoryHandle,
        tracked: &TrackedTree,
        message: &str,
        staging: &Staging,
        deadline: &Deadline,
    ) -> Result<CommitResult> {
        let vcs = self.vcs();
        vcs.stage(tracked, staging, deadline)?;

        match vcs.commit(tracked, message, &self.author(), deadline)? {
            CommitOutcome::Created(info) => {
                let short = info.hash.short().to_string();
                let result = CommitResult::from_info(info, true);
                handle.update_metadata(|meta| {
                    meta.last_commit = Some(LastCommit {
                        hash: result.hash.clone(),
                        message: result.message.clone(),
                        timestamp: result.timestamp,
                        files_changed: result.files_changed,
                    });
                })?;
                info!(
                    owner = handle.owner_id(),
                    project = handle.project_id(),
                    hash = %short,
                    files = result.files_changed,
                    "Committed"
                );
                Ok(result)
            }
            CommitOutcome::NoChanges(head) => {
                debug!(head = head.short(), "Nothing to commit");
                let info = vcs.commit_info(tracked, &head)?;
                Ok(CommitResult::from_info(info, false))
            }
        }
    }

    /// Filters an explicit file list down to paths that exist inside the tree.
    fn existing_paths(&self, root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
        let internal = self.vcs().internal_dir();
        files
            .iter()
            .filter_map(|path| {
                let relative = if path.is_absolute() {
                    path.strip_prefix(root).ok()?.to_path_buf()
                } else {
                    path.clone()
                };
                let mut components = relative.components();
                let first = components.clone().next()?;
                if first.as_os_str() == internal
                    || components.any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
                {
                    debug!(path = %path.display(), "Skipping path outside tree");
                    return None;
                }
                if root.join(&relative).symlink_metadata().is_err() {
                    debug!(path = %path.display(), "Skipping missing path");
                    return None;
                }
                Some(relative)
            })
            .collect()
    }

    /// First-parent history from HEAD, newest first.
    pub fn history(&self, handle: &RepositoryHandle, limit: usize, skip: usize) -> Result<CommitHistory> {
        let tracked = handle.tracked_tree(self.vcs())?;
        let commits = self.vcs().commit_history(&tracked, limit, skip)?;
        let total = self.vcs().commit_count(&tracked)?;
        Ok(CommitHistory {
            commits,
            total,
            limit,
            skip,
        })
    }
}
