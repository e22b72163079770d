//! Service facade wiring configuration and the version-control backend.
//!
//! Each component adds its operations to [`Checkpointer`] in its own module:
//! repositories in `repository`, commits in `commit`, checkpoints in
//! `checkpoint`, restores in `restore`, migrations in `migration`, and
//! maintenance in `verify` and `gc`.

use crate::config::Config;
use crate::error::Result;
use crate::lock::{Deadline, RepoLock};
use crate::repository::RepositoryHandle;
use crate::vcs::{ObjectVcs, VersionControl};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Entry point for every checkpoint operation on one data root.
///
/// Holds no per-repository state: everything lives in persisted records, so
/// independent `Checkpointer`s (or processes) over the same root cooperate
/// through the repository locks.
#[derive(Clone)]
pub struct Checkpointer {
    config: Config,
    vcs: Arc<dyn VersionControl>,
}

impl Checkpointer {
    /// Creates a service using the embedded [`ObjectVcs`] backend.
    pub fn new(config: Config) -> Self {
        let vcs = Arc::new(ObjectVcs::with_compression(config.storage.compression_level));
        Self::with_backend(config, vcs)
    }

    /// Creates a service over a caller-supplied backend.
    pub fn with_backend(config: Config, vcs: Arc<dyn VersionControl>) -> Self {
        Self { config, vcs }
    }

    /// Loads `<data_root>/config.toml` (defaults if absent) and creates a service.
    pub fn open(data_root: &Path) -> Result<Self> {
        Ok(Self::new(Config::load(data_root)?))
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Version-control backend.
    pub fn vcs(&self) -> &dyn VersionControl {
        self.vcs.as_ref()
    }

    pub(crate) fn repo_dir(&self, owner_id: &str, project_id: &str) -> PathBuf {
        self.config.repos_dir().join(owner_id).join(project_id)
    }

    /// Directory holding a checkpoint's record and snapshot.
    pub fn checkpoint_dir(&self, checkpoint_id: &str) -> PathBuf {
        self.config.checkpoints_dir().join(checkpoint_id)
    }

    pub(crate) fn lock(&self, handle: &RepositoryHandle) -> Result<RepoLock> {
        RepoLock::acquire(&handle.lock_path(), self.config.limits.lock_timeout())
    }

    pub(crate) fn deadline(&self, timeout: Option<Duration>) -> Deadline {
        Deadline::after(timeout.unwrap_or_else(|| self.config.limits.operation_timeout()))
    }

    pub(crate) fn author(&self) -> String {
        self.config.commit.author()
    }
}

impl std::fmt::Debug for Checkpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpointer")
            .field("data_root", &self.config.storage.data_root)
            .field("vcs_internal_dir", &self.vcs.internal_dir())
            .finish()
    }
}
