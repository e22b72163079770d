use anyhow::{Context, Result};
use ckpt_core::{tree_fingerprint, Checkpointer, Config, RepositoryHandle};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated data root with a service over it
pub struct TestWorkspace {
    dir: TempDir,
    svc: Checkpointer,
}

impl TestWorkspace {
    /// Create a workspace with default configuration
    pub fn empty() -> Result<Self> {
        Self::with_config(|_| {})
    }

    /// Create a workspace after adjusting the configuration
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        let mut config = Config::with_root(dir.path());
        adjust(&mut config);
        config.save()?;
        let svc = Checkpointer::open(dir.path())?;
        Ok(Self { dir, svc })
    }

    /// Data root path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn service(&self) -> &Checkpointer {
        &self.svc
    }

    /// A second, independent service over the same data root
    pub fn reopen_service(&self) -> Result<Checkpointer> {
        Ok(Checkpointer::open(self.path())?)
    }

    pub fn create_repo(&self, owner: &str, project: &str) -> Result<RepositoryHandle> {
        Ok(self
            .svc
            .create_repository(owner, project, project, "created by e2e tests")?)
    }

    pub fn open_repo(&self, owner: &str, project: &str) -> Result<RepositoryHandle> {
        Ok(self.svc.open_repository(owner, project)?)
    }

    /// Write a file into a repository's working tree
    pub fn write_file(&self, handle: &RepositoryHandle, path: &str, content: &[u8]) -> Result<()> {
        let full_path = handle.tree_root().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", path))
    }

    pub fn read_file(&self, handle: &RepositoryHandle, path: &str) -> Result<Vec<u8>> {
        let full_path = handle.tree_root().join(path);
        fs::read(&full_path).with_context(|| format!("Failed to read file: {}", path))
    }

    pub fn delete_file(&self, handle: &RepositoryHandle, path: &str) -> Result<()> {
        let full_path = handle.tree_root().join(path);
        if full_path.is_dir() {
            fs::remove_dir_all(&full_path)?;
        } else {
            fs::remove_file(&full_path)?;
        }
        Ok(())
    }

    pub fn file_exists(&self, handle: &RepositoryHandle, path: &str) -> bool {
        handle.tree_root().join(path).exists()
    }

    /// Content hash of the working tree, excluding version-control internals
    pub fn tree_hash(&self, handle: &RepositoryHandle) -> Result<String> {
        Ok(tree_fingerprint(
            &handle.tree_root(),
            self.svc.vcs().internal_dir(),
        )?)
    }

    /// Snapshot directory of a checkpoint
    pub fn snapshot_dir(&self, checkpoint_id: &str) -> PathBuf {
        self.svc.checkpoint_snapshot_dir(checkpoint_id)
    }
}
