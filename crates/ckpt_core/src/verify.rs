//! Consistency checks for repositories and the data root.

use crate::checkpoint::STAGING_PREFIX;
use crate::error::Result;
use crate::metadata::{RepositoryMetadata, METADATA_FILE};
use crate::repository::{leftover_trees, RepositoryHandle};
use crate::service::Checkpointer;
use crate::vcs::TrackedTree;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Findings from [`Checkpointer::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub owner_id: String,
    pub project_id: String,

    /// Index entries examined.
    pub checkpoints_checked: usize,

    /// Index entries whose record is missing or unreadable.
    pub dangling_refs: Vec<String>,

    /// Index entries whose record belongs to another repository.
    pub foreign_refs: Vec<String>,

    /// Checkpoints whose record exists but whose snapshot is gone.
    pub missing_snapshots: Vec<String>,

    /// `tree.old-*` / `tree.restore-*` directories from an interrupted restore.
    pub leftover_trees: Vec<PathBuf>,

    /// Current HEAD, if readable.
    pub head: Option<String>,

    /// Why HEAD could not be read.
    pub head_error: Option<String>,

    /// Commits reachable from HEAD.
    pub commit_count: usize,
}

impl ConsistencyReport {
    /// Returns true if any issues were found.
    pub fn has_issues(&self) -> bool {
        !self.dangling_refs.is_empty()
            || !self.foreign_refs.is_empty()
            || !self.missing_snapshots.is_empty()
            || !self.leftover_trees.is_empty()
            || self.head_error.is_some()
    }

    /// Returns a summary message.
    pub fn summary(&self) -> String {
        if !self.has_issues() {
            return "Repository is healthy. No issues found.".to_string();
        }
        let mut issues = Vec::new();
        if !self.dangling_refs.is_empty() {
            issues.push(format!("{} dangling checkpoint refs", self.dangling_refs.len()));
        }
        if !self.foreign_refs.is_empty() {
            issues.push(format!("{} foreign checkpoint refs", self.foreign_refs.len()));
        }
        if !self.missing_snapshots.is_empty() {
            issues.push(format!("{} missing snapshots", self.missing_snapshots.len()));
        }
        if !self.leftover_trees.is_empty() {
            issues.push(format!("{} leftover restore trees", self.leftover_trees.len()));
        }
        if self.head_error.is_some() {
            issues.push("unreadable HEAD".to_string());
        }
        format!("Repository has issues: {}", issues.join(", "))
    }
}

/// Findings from [`Checkpointer::health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub data_root: PathBuf,
    pub repos_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    /// Repositories with a metadata record.
    pub repositories: usize,
    /// Finalized checkpoint directories.
    pub checkpoints: usize,
    pub problems: Vec<String>,
}

impl Checkpointer {
    /// Checks a repository's index, HEAD and working-tree directories.
    ///
    /// Read-only: takes no lock and repairs nothing.
    pub fn verify(&self, handle: &RepositoryHandle) -> Result<ConsistencyReport> {
        let metadata = RepositoryMetadata::load(&handle.metadata_path())?;
        let mut report = ConsistencyReport {
            owner_id: metadata.owner_id.clone(),
            project_id: metadata.project_id.clone(),
            ..ConsistencyReport::default()
        };

        for entry in &metadata.checkpoints {
            report.checkpoints_checked += 1;
            match self.get_checkpoint(&entry.id) {
                Ok(checkpoint)
                    if checkpoint.owner_id != metadata.owner_id
                        || checkpoint.project_id != metadata.project_id =>
                {
                    report.foreign_refs.push(entry.id.clone());
                }
                Ok(_) => {
                    if !self.checkpoint_snapshot_dir(&entry.id).is_dir() {
                        report.missing_snapshots.push(entry.id.clone());
                    }
                }
                Err(e) => {
                    debug!(id = %entry.id, error = %e, "Dangling checkpoint ref");
                    report.dangling_refs.push(entry.id.clone());
                }
            }
        }

        report.leftover_trees = leftover_trees(handle.repo_dir())?;

        let vcs = self.vcs();
        let root = handle.tree_root();
        if root.is_dir() {
            // Wrapped directly so a missing or broken HEAD is reported, not raised
            let tracked = TrackedTree::new(root);
            match vcs.head_commit(&tracked) {
                Ok(head) => {
                    report.head = Some(head.to_string());
                    report.commit_count = vcs.commit_count(&tracked)?;
                }
                Err(e) => report.head_error = Some(e.to_string()),
            }
        } else {
            report.head_error = Some(format!("working tree {} is missing", root.display()));
        }

        if report.has_issues() {
            warn!(
                owner = %report.owner_id,
                project = %report.project_id,
                "{}",
                report.summary()
            );
        }
        Ok(report)
    }

    /// Ensures the storage directories exist and are writable.
    pub fn health(&self) -> Result<HealthReport> {
        let config = self.config();
        let repos_dir = config.repos_dir();
        let checkpoints_dir = config.checkpoints_dir();
        let mut problems = Vec::new();

        for dir in [&repos_dir, &checkpoints_dir] {
            if let Err(e) = probe_writable(dir) {
                problems.push(format!("{} is not writable: {}", dir.display(), e));
            }
        }

        let report = HealthReport {
            healthy: problems.is_empty(),
            data_root: config.storage.data_root.clone(),
            repositories: count_repositories(&repos_dir),
            checkpoints: count_checkpoints(&checkpoints_dir),
            repos_dir,
            checkpoints_dir,
            problems,
        };
        if !report.healthy {
            warn!(problems = ?report.problems, "Storage unhealthy");
        }
        Ok(report)
    }
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(format!(".health-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)
}

fn count_repositories(repos_dir: &Path) -> usize {
    let Ok(owners) = fs::read_dir(repos_dir) else {
        return 0;
    };
    owners
        .flatten()
        .filter_map(|owner| fs::read_dir(owner.path()).ok())
        .flat_map(|projects| projects.flatten())
        .filter(|project| project.path().join(METADATA_FILE).is_file())
        .count()
}

fn count_checkpoints(checkpoints_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(checkpoints_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| {
            !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX)
                && entry.path().is_dir()
        })
        .count()
}
