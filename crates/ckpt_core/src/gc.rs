//! Reaping of abandoned storage.
//!
//! Two passes, both bounded by `gc.grace_period_hours` so in-flight work is
//! never touched:
//!
//! 1. **Data root** ([`Checkpointer::gc`]): `.staging-*` checkpoint
//!    directories, `.init-*` repository directories, and checkpoint
//!    directories no repository index refers to.
//! 2. **Objects** ([`Checkpointer::gc_objects`]): mark-and-sweep of one
//!    repository's version-control objects, under its lock.

use crate::checkpoint::{is_valid_checkpoint_id, STAGING_PREFIX};
use crate::error::Result;
use crate::fsutil::count_tree;
use crate::metadata::{RepositoryMetadata, METADATA_FILE};
use crate::repository::{RepositoryHandle, INIT_MARKER};
use crate::service::Checkpointer;
use crate::vcs::ObjectGcReport;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Options for both passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcOptions {
    /// Report what would be removed without removing it.
    pub dry_run: bool,

    /// Skip the grace period and reap immediately.
    /// Only safe while no other operation is running on the data root.
    pub aggressive: bool,
}

/// Report from reaping the data root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub dry_run: bool,

    /// Abandoned `.staging-*` checkpoint directories.
    pub staging_removed: Vec<PathBuf>,

    /// Abandoned `.init-*` repository directories.
    pub init_dirs_removed: Vec<PathBuf>,

    /// Checkpoint ids not referenced by any repository.
    pub orphaned_checkpoints: Vec<String>,

    /// Bytes of file content removed (or that would be).
    pub bytes_freed: u64,

    /// Non-fatal errors.
    pub errors: Vec<String>,
}

impl GcReport {
    /// Directories removed (or that would be).
    pub fn removed(&self) -> usize {
        self.staging_removed.len() + self.init_dirs_removed.len() + self.orphaned_checkpoints.len()
    }
}

impl GcOptions {
    fn grace(&self, configured: Duration) -> Duration {
        if self.aggressive {
            Duration::ZERO
        } else {
            configured
        }
    }
}

impl Checkpointer {
    /// Reaps abandoned directories across the data root.
    ///
    /// Orphaned checkpoints are only reaped when every repository index could
    /// be read; otherwise that step is skipped and the failure reported.
    pub fn gc(&self, options: GcOptions) -> Result<GcReport> {
        let grace = options.grace(self.config().gc.grace_period());
        let mut report = GcReport {
            dry_run: options.dry_run,
            ..GcReport::default()
        };

        let checkpoints_dir = self.config().checkpoints_dir();
        let repos_dir = self.config().repos_dir();

        let mut indexed = HashSet::new();
        let index_complete = self.collect_indexed(&repos_dir, &mut indexed, &mut report);

        for path in list_dirs(&checkpoints_dir)? {
            let name = file_name(&path);
            if name.starts_with(STAGING_PREFIX) {
                if older_than(&path, grace) && reap(&path, options.dry_run, &mut report) {
                    report.staging_removed.push(path);
                }
            } else if index_complete
                && is_valid_checkpoint_id(&name)
                && !indexed.contains(&name)
                && older_than(&path, grace)
                && reap(&path, options.dry_run, &mut report)
            {
                report.orphaned_checkpoints.push(name);
            }
        }

        for owner in list_dirs(&repos_dir)? {
            for path in list_dirs(&owner)? {
                if file_name(&path).contains(INIT_MARKER)
                    && older_than(&path, grace)
                    && reap(&path, options.dry_run, &mut report)
                {
                    report.init_dirs_removed.push(path);
                }
            }
        }

        info!(
            removed = report.removed(),
            bytes = report.bytes_freed,
            dry_run = options.dry_run,
            "Reaped data root"
        );
        Ok(report)
    }

    /// Gathers every checkpoint id referenced by a repository index.
    /// Returns false if any index could not be read.
    fn collect_indexed(
        &self,
        repos_dir: &Path,
        indexed: &mut HashSet<String>,
        report: &mut GcReport,
    ) -> bool {
        let owners = match list_dirs(repos_dir) {
            Ok(owners) => owners,
            Err(e) => {
                report.errors.push(format!("{}: {}", repos_dir.display(), e));
                return false;
            }
        };

        let mut complete = true;
        for owner in owners {
            let projects = match list_dirs(&owner) {
                Ok(projects) => projects,
                Err(e) => {
                    report.errors.push(format!("{}: {}", owner.display(), e));
                    complete = false;
                    continue;
                }
            };
            for project in projects {
                if file_name(&project).contains(INIT_MARKER) {
                    continue;
                }
                match RepositoryMetadata::load(&project.join(METADATA_FILE)) {
                    Ok(metadata) => {
                        indexed.extend(metadata.checkpoints.into_iter().map(|c| c.id));
                    }
                    Err(e) => {
                        warn!(repo = %project.display(), error = %e, "Unreadable index, keeping unindexed checkpoints");
                        report.errors.push(format!("{}: {}", project.display(), e));
                        complete = false;
                    }
                }
            }
        }
        complete
    }

    /// Sweeps unreachable version-control objects of one repository.
    pub fn gc_objects(
        &self,
        handle: &RepositoryHandle,
        options: GcOptions,
    ) -> Result<ObjectGcReport> {
        let tracked = handle.tracked_tree(self.vcs())?;
        let _lock = self.lock(handle)?;
        let grace = options.grace(self.config().gc.grace_period());

        let report = self.vcs().collect_garbage(&tracked, grace, options.dry_run)?;
        info!(
            owner = handle.owner_id(),
            project = handle.project_id(),
            scanned = report.objects_scanned,
            deleted = report.objects_deleted,
            bytes = report.bytes_freed,
            dry_run = options.dry_run,
            "Collected objects"
        );
        Ok(report)
    }
}

fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn older_than(path: &Path, grace: Duration) -> bool {
    if grace.is_zero() {
        return true;
    }
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age >= grace)
}

/// Removes `path` unless `dry_run`. Returns false if removal failed.
fn reap(path: &Path, dry_run: bool, report: &mut GcReport) -> bool {
    let bytes = count_tree(path, "").map(|s| s.bytes).unwrap_or(0);
    if !dry_run {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "Failed to reap directory");
            report.errors.push(format!("{}: {}", path.display(), e));
            return false;
        }
    }
    report.bytes_freed += bytes;
    true
}
