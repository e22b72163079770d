//! Restoring a working tree to a checkpoint.
//!
//! Phases run in order: validating, safety checkpointing, swapping,
//! recommitting. Failures in the first two leave the live tree untouched.
//! The swap replaces the tree by renames:
//!
//! 1. copy the snapshot to `tree.restore-<token>` and verify its file count
//! 2. rename `tree` to `tree.old-<token>`
//! 3. rename `tree.restore-<token>` to `tree`
//! 4. move `.ckpt` from the old tree into the new one
//! 5. remove `tree.old-<token>`
//!
//! `open_repository` completes or rolls back a swap cut short between steps.

use crate::checkpoint::{Checkpoint, CheckpointRequest};
use crate::commit::CommitResult;
use crate::error::{CkptError, Result};
use crate::fsutil::{copy_tree, remove_dir_best_effort, sync_dir};
use crate::lock::Deadline;
use crate::repository::{RepositoryHandle, OLD_TREE_PREFIX, RESTORE_TREE_PREFIX};
use crate::service::Checkpointer;
use crate::vcs::Staging;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Stage of a restore, reported in failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Validating,
    SafetyCheckpointing,
    Swapping,
    Recommitting,
    Done,
}

impl RestorePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::SafetyCheckpointing => "safety_checkpointing",
            Self::Swapping => "swapping",
            Self::Recommitting => "recommitting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restore parameters.
#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    /// Checkpoint the current state before touching it (default: true).
    pub create_safety_backup: bool,
    /// Overrides `limits.operation_timeout_secs`.
    pub timeout: Option<Duration>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            create_safety_backup: true,
            timeout: None,
        }
    }
}

impl RestoreOptions {
    /// Options that skip the safety checkpoint.
    pub fn without_backup() -> Self {
        Self {
            create_safety_backup: false,
            ..Self::default()
        }
    }
}

/// Outcome of a completed restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Checkpoint that was restored.
    pub restored: Checkpoint,
    /// Commit recording the restored state, or HEAD if nothing differed.
    pub commit_hash: String,
    /// False when the checkpoint matched HEAD and no commit was made.
    pub changed: bool,
    /// Checkpoint holding the pre-restore state.
    pub safety_checkpoint: Option<Checkpoint>,
    pub message: String,
}

impl Checkpointer {
    /// Reverts the working tree to `checkpoint_id`.
    ///
    /// # Errors
    ///
    /// `CheckpointNotFound` / `InvalidArgument` / `CorruptState` while
    /// validating, any checkpoint error while taking the safety checkpoint
    /// (the restore is then abandoned untouched), and `RestoreFailed` once
    /// the live tree is being replaced.
    pub fn restore(
        &self,
        handle: &mut RepositoryHandle,
        checkpoint_id: &str,
        options: RestoreOptions,
    ) -> Result<RestoreResult> {
        // Validating
        let target = self.get_checkpoint(checkpoint_id)?;
        if target.owner_id != handle.owner_id() || target.project_id != handle.project_id() {
            return Err(CkptError::InvalidArgument(format!(
                "checkpoint {} belongs to {}/{}",
                target.id, target.owner_id, target.project_id
            )));
        }
        let snapshot = self.checkpoint_snapshot_dir(&target.id);
        if !snapshot.is_dir() {
            return Err(CkptError::CorruptState {
                path: snapshot,
                reason: "checkpoint snapshot is missing".to_string(),
            });
        }
        let tracked = handle.tracked_tree(self.vcs())?;
        let _lock = self.lock(handle)?;
        let deadline = self.deadline(options.timeout);

        // SafetyCheckpointing
        let safety = if options.create_safety_backup {
            Some(self.take_safety_checkpoint(handle, &tracked, &target, &deadline)?)
        } else {
            None
        };
        let safety_id = safety.as_ref().map(|c| c.id.clone());
        let failed = |phase: RestorePhase, source: CkptError| CkptError::RestoreFailed {
            phase: phase.to_string(),
            safety_checkpoint: safety_id.clone(),
            source: Box::new(source),
        };

        // Swapping
        self.swap_tree(handle, &snapshot, &target, &deadline)
            .map_err(|e| failed(RestorePhase::Swapping, e))?;

        // Recommitting
        let message = format!("Restore from checkpoint: {}", target.name);
        let commit = self
            .recommit(handle, &message, &deadline)
            .map_err(|e| failed(RestorePhase::Recommitting, e))?;

        info!(
            id = %target.id,
            name = %target.name,
            changed = commit.changed,
            safety = ?safety_id,
            "Restored checkpoint"
        );

        Ok(RestoreResult {
            restored: target,
            commit_hash: commit.hash,
            changed: commit.changed,
            safety_checkpoint: safety,
            message,
        })
    }

    fn take_safety_checkpoint(
        &self,
        handle: &mut RepositoryHandle,
        tracked: &crate::vcs::TrackedTree,
        target: &Checkpoint,
        deadline: &Deadline,
    ) -> Result<Checkpoint> {
        let request = CheckpointRequest::new(format!(
            "pre_restore_{}_{}",
            target.id,
            Utc::now().timestamp()
        ))
        .with_description(format!(
            "Safety backup before restoring checkpoint {}",
            target.name
        ))
        .with_timeout(deadline.remaining());

        let safety = self.create_checkpoint_locked(handle, tracked, request)?;

        // The backup only counts once it is reachable from the index
        if handle.metadata().checkpoint_ref(&safety.id).is_none() {
            return Err(CkptError::CorruptState {
                path: handle.metadata_path(),
                reason: format!("safety checkpoint {} missing from index", safety.id),
            });
        }
        Ok(safety)
    }

    fn swap_tree(
        &self,
        handle: &RepositoryHandle,
        snapshot: &Path,
        target: &Checkpoint,
        deadline: &Deadline,
    ) -> Result<()> {
        let repo_dir = handle.repo_dir();
        let live = handle.tree_root();
        let internal = self.vcs().internal_dir();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let incoming = repo_dir.join(format!("{}{}", RESTORE_TREE_PREFIX, token));
        let outgoing = repo_dir.join(format!("{}{}", OLD_TREE_PREFIX, token));

        let prepared = copy_tree(snapshot, &incoming, internal, deadline).and_then(|stats| {
            if stats.files != target.file_count {
                return Err(CkptError::CorruptState {
                    path: snapshot.to_path_buf(),
                    reason: format!(
                        "snapshot holds {} files, checkpoint recorded {}",
                        stats.files, target.file_count
                    ),
                });
            }
            deadline.check("tree swap")
        });
        if let Err(e) = prepared {
            remove_dir_best_effort(&incoming);
            return Err(e);
        }

        if let Err(e) = fs::rename(&live, &outgoing) {
            remove_dir_best_effort(&incoming);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&incoming, &live) {
            if let Err(back) = fs::rename(&outgoing, &live) {
                warn!(error = %back, "Could not put the original tree back");
            }
            remove_dir_best_effort(&incoming);
            return Err(e.into());
        }

        let history = outgoing.join(internal);
        if history.exists() {
            fs::rename(&history, live.join(internal))?;
        }
        sync_dir(repo_dir);
        remove_dir_best_effort(&outgoing);
        Ok(())
    }

    fn recommit(
        &self,
        handle: &mut RepositoryHandle,
        message: &str,
        deadline: &Deadline,
    ) -> Result<CommitResult> {
        let tracked = handle.tracked_tree(self.vcs())?;
        self.commit_locked(handle, &tracked, message, &Staging::All, deadline)
    }
}
