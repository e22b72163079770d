//! Repository lifecycle: creation, opening and crash repair.
//!
//! A repository directory looks like:
//!
//! ```text
//! repos/<owner>/<project>/
//!     LOCK            advisory lock for mutating operations
//!     metadata.json   sidecar record (survives restores untouched)
//!     tree/           working tree; tree/.ckpt holds version-control state
//! ```

use crate::error::{CkptError, Result};
use crate::fsutil::{remove_dir_best_effort, sync_dir, validate_id};
use crate::lock::RepoLock;
use crate::metadata::{CheckpointRef, LastCommit, RepositoryMetadata, METADATA_FILE};
use crate::service::Checkpointer;
use crate::vcs::{Staging, TrackedTree, VersionControl};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Working tree directory inside a repository.
pub const TREE_DIR: &str = "tree";
/// Lock file inside a repository.
pub const LOCK_FILE: &str = "LOCK";
/// Prefix of the live tree while a restore swaps it out.
pub const OLD_TREE_PREFIX: &str = "tree.old-";
/// Prefix of a snapshot copy waiting to become the live tree.
pub const RESTORE_TREE_PREFIX: &str = "tree.restore-";
/// Marker in the names of repository directories still being seeded.
pub const INIT_MARKER: &str = ".init-";

/// Commit message of the seed commit.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit - project setup";
/// Display name used when none is given.
pub const DEFAULT_DISPLAY_NAME: &str = "Untitled Project";

const SEED_GITIGNORE: &str = "\
# Dependencies
node_modules/
*.log
npm-debug.log*

# Build outputs
dist/
build/
target/
*.tgz

# Environment files
.env
.env.local

# IDE files
.vscode/
.idea/

# OS files
.DS_Store
Thumbs.db
";

fn seed_readme(display_name: &str, description: &str) -> String {
    let mut readme = format!("# {}\n\n", display_name);
    if !description.trim().is_empty() {
        readme.push_str(description.trim());
        readme.push_str("\n\n");
    }
    readme.push_str(
        "## Getting Started\n\n\
         This workspace is tracked automatically. Work is committed as you go,\n\
         and named checkpoints can be restored at any time.\n",
    );
    readme
}

/// An opened repository: identity, paths and the last loaded metadata.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    owner_id: String,
    project_id: String,
    repo_dir: PathBuf,
    metadata: RepositoryMetadata,
}

impl RepositoryHandle {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Directory holding the tree, lock and metadata.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Root of the live working tree.
    pub fn tree_root(&self) -> PathBuf {
        self.repo_dir.join(TREE_DIR)
    }

    pub fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    pub fn last_commit(&self) -> Option<&LastCommit> {
        self.metadata.last_commit.as_ref()
    }

    /// Checkpoint index, oldest first.
    pub fn checkpoint_refs(&self) -> &[CheckpointRef] {
        &self.metadata.checkpoints
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.repo_dir.join(LOCK_FILE)
    }

    pub(crate) fn metadata_path(&self) -> PathBuf {
        self.repo_dir.join(METADATA_FILE)
    }

    /// Re-reads the metadata record from disk.
    pub fn refresh(&mut self) -> Result<()> {
        self.metadata = RepositoryMetadata::load(&self.metadata_path())?;
        Ok(())
    }

    /// Applies `update` to the on-disk record and persists it.
    ///
    /// Callers hold the repository lock, so the read-modify-write never
    /// loses a concurrent update.
    pub(crate) fn update_metadata(
        &mut self,
        update: impl FnOnce(&mut RepositoryMetadata),
    ) -> Result<()> {
        let path = self.metadata_path();
        let mut metadata = RepositoryMetadata::load(&path)?;
        update(&mut metadata);
        metadata.save(&path)?;
        self.metadata = metadata;
        Ok(())
    }

    /// Opens the working tree through the backend without initializing it.
    ///
    /// A tree without readable history is `CorruptState`; opening the
    /// repository again repairs it when a restore was cut short.
    pub(crate) fn tracked_tree(&self, vcs: &dyn VersionControl) -> Result<TrackedTree> {
        let root = self.tree_root();
        if !root.is_dir() {
            return Err(CkptError::RepositoryNotFound {
                owner: self.owner_id.clone(),
                project: self.project_id.clone(),
            });
        }
        vcs.open(&root)
    }
}

impl Checkpointer {
    /// Creates and seeds a repository for `(owner_id, project_id)`.
    ///
    /// The repository is assembled in a hidden sibling directory and renamed
    /// into place only once fully seeded and committed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for malformed ids, `RepositoryExists` if the
    /// repository is already present.
    pub fn create_repository(
        &self,
        owner_id: &str,
        project_id: &str,
        display_name: &str,
        description: &str,
    ) -> Result<RepositoryHandle> {
        validate_id("owner_id", owner_id)?;
        validate_id("project_id", project_id)?;

        let repo_dir = self.repo_dir(owner_id, project_id);
        let exists = || CkptError::RepositoryExists {
            owner: owner_id.to_string(),
            project: project_id.to_string(),
        };
        if repo_dir.exists() {
            return Err(exists());
        }

        let display_name = match display_name.trim() {
            "" => DEFAULT_DISPLAY_NAME,
            name => name,
        };
        let metadata = RepositoryMetadata::new(owner_id, project_id, display_name, description);

        let owner_dir = self.config().repos_dir().join(owner_id);
        fs::create_dir_all(&owner_dir)?;
        let staging = owner_dir.join(format!(
            ".{}{}{}",
            project_id,
            INIT_MARKER,
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(e) = self.seed_repository(&staging, &metadata) {
            remove_dir_best_effort(&staging);
            return Err(e);
        }

        if repo_dir.exists() {
            remove_dir_best_effort(&staging);
            return Err(exists());
        }
        if let Err(e) = fs::rename(&staging, &repo_dir) {
            remove_dir_best_effort(&staging);
            return Err(if repo_dir.exists() { exists() } else { e.into() });
        }
        sync_dir(&owner_dir);

        info!(owner = owner_id, project = project_id, "Created repository");

        Ok(RepositoryHandle {
            owner_id: owner_id.to_string(),
            project_id: project_id.to_string(),
            repo_dir,
            metadata,
        })
    }

    fn seed_repository(&self, dir: &Path, metadata: &RepositoryMetadata) -> Result<()> {
        let tree_root = dir.join(TREE_DIR);
        fs::create_dir_all(&tree_root)?;

        fs::write(tree_root.join(".gitignore"), SEED_GITIGNORE)?;
        fs::write(
            tree_root.join("README.md"),
            seed_readme(&metadata.display_name, &metadata.description),
        )?;

        let vcs = self.vcs();
        let deadline = self.deadline(None);
        let tracked = vcs.open_or_init(&tree_root)?;
        vcs.stage(
            &tracked,
            &Staging::Paths(vec![PathBuf::from(".gitignore"), PathBuf::from("README.md")]),
            &deadline,
        )?;
        vcs.commit(&tracked, INITIAL_COMMIT_MESSAGE, &self.author(), &deadline)?;

        metadata.save(&dir.join(METADATA_FILE))
    }

    /// Opens an existing repository, first repairing an interrupted restore.
    ///
    /// # Errors
    ///
    /// `RepositoryNotFound` if there is no working tree, `CorruptState` if the
    /// tree exists but its metadata record is missing or unreadable.
    pub fn open_repository(&self, owner_id: &str, project_id: &str) -> Result<RepositoryHandle> {
        validate_id("owner_id", owner_id)?;
        validate_id("project_id", project_id)?;

        let repo_dir = self.repo_dir(owner_id, project_id);
        let not_found = || CkptError::RepositoryNotFound {
            owner: owner_id.to_string(),
            project: project_id.to_string(),
        };
        if !repo_dir.is_dir() {
            return Err(not_found());
        }

        self.repair_interrupted_restore(&repo_dir)?;

        if !repo_dir.join(TREE_DIR).is_dir() {
            return Err(not_found());
        }

        let metadata = match RepositoryMetadata::load(&repo_dir.join(METADATA_FILE)) {
            Ok(metadata) => metadata,
            Err(CkptError::InvalidMetadata { path, reason }) => {
                return Err(CkptError::CorruptState { path, reason })
            }
            Err(e) => return Err(e),
        };

        Ok(RepositoryHandle {
            owner_id: owner_id.to_string(),
            project_id: project_id.to_string(),
            repo_dir,
            metadata,
        })
    }

    /// Finishes or rolls back a tree swap cut short by a crash.
    ///
    /// - live tree missing: the displaced tree is renamed back
    /// - live tree without readable history: version-control state is moved
    ///   over from the newest displaced tree that has one
    /// - leftover displaced trees and unswapped snapshot copies are removed
    fn repair_interrupted_restore(&self, repo_dir: &Path) -> Result<()> {
        if leftover_trees(repo_dir)?.is_empty() {
            return Ok(());
        }

        let _lock = RepoLock::acquire(
            &repo_dir.join(LOCK_FILE),
            self.config().limits.lock_timeout(),
        )?;
        let leftovers = leftover_trees(repo_dir)?;
        if leftovers.is_empty() {
            return Ok(());
        }

        let vcs = self.vcs();
        let internal = vcs.internal_dir();
        let live = repo_dir.join(TREE_DIR);
        let mut old_trees: Vec<PathBuf> = leftovers
            .iter()
            .filter(|p| has_prefix(p, OLD_TREE_PREFIX))
            .cloned()
            .collect();
        old_trees.sort_by_key(|p| fs::metadata(p).and_then(|m| m.modified()).ok());

        if !live.exists() {
            if let Some(newest) = old_trees.pop() {
                warn!(from = %newest.display(), "Rolling back interrupted restore");
                fs::rename(&newest, &live)?;
            }
        }

        if live.is_dir() && vcs.open(&live).is_err() {
            if let Some(source) = old_trees.iter().rev().find(|p| vcs.open(p).is_ok()) {
                warn!(from = %source.display(), "Reattaching history after interrupted restore");
                let target = live.join(internal);
                if target.exists() {
                    fs::remove_dir_all(&target)?;
                }
                fs::rename(source.join(internal), target)?;
            } else {
                warn!(path = %live.display(), "Working tree has no readable history");
            }
        }

        for leftover in leftovers {
            if leftover.exists() {
                remove_dir_best_effort(&leftover);
            }
        }
        sync_dir(repo_dir);
        Ok(())
    }
}

/// `tree.old-*` and `tree.restore-*` directories left in a repository.
pub(crate) fn leftover_trees(repo_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(repo_dir)? {
        let path = entry?.path();
        if has_prefix(&path, OLD_TREE_PREFIX) || has_prefix(&path, RESTORE_TREE_PREFIX) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn has_prefix(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix))
}
