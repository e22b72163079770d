//! Pointer files for HEAD, the main branch and the staged tree.

use crate::error::{CkptError, Result};
use crate::ObjectId;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Branch every commit advances.
pub const MAIN_REF: &str = "main";

/// Manages pointer files inside a tree's `.ckpt` directory.
///
/// Each pointer is a single line holding a hex ObjectId. Writes go through
/// temp file + fsync + rename.
pub struct Refs {
    root: PathBuf,
}

impl Refs {
    /// Creates a Refs manager for the given `.ckpt` directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Reads the HEAD commit.
    ///
    /// # Errors
    ///
    /// Returns `VersionControl` if HEAD is missing or malformed.
    pub fn read_head(&self) -> Result<ObjectId> {
        self.read_ref_file(&self.root.join("HEAD"))?
            .ok_or_else(|| CkptError::VersionControl("HEAD is missing".to_string()))
    }

    /// Points HEAD and the main branch at `id`.
    pub fn advance_head(&self, id: ObjectId) -> Result<()> {
        let refs_dir = self.root.join("refs");
        fs::create_dir_all(&refs_dir)?;
        self.write_ref_file(&refs_dir.join(MAIN_REF), id)?;
        self.write_ref_file(&self.root.join("HEAD"), id)
    }

    /// Reads a named reference, `None` if it does not exist.
    pub fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        self.read_ref_file(&self.root.join("refs").join(name))
    }

    /// Reads the staged tree, `None` if nothing is staged.
    pub fn read_stage(&self) -> Result<Option<ObjectId>> {
        self.read_ref_file(&self.root.join("STAGE"))
    }

    /// Records the staged tree.
    pub fn write_stage(&self, tree: ObjectId) -> Result<()> {
        self.write_ref_file(&self.root.join("STAGE"), tree)
    }

    /// Clears the staged tree. Does nothing if nothing is staged.
    pub fn clear_stage(&self) -> Result<()> {
        let path = self.root.join("STAGE");
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn read_ref_file(&self, path: &Path) -> Result<Option<ObjectId>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        ObjectId::from_hex(content.trim()).map(Some).map_err(|_| {
            CkptError::CorruptState {
                path: path.to_path_buf(),
                reason: "ref does not hold a valid object id".to_string(),
            }
        })
    }

    fn write_ref_file(&self, path: &Path, id: ObjectId) -> Result<()> {
        let tmp_path = path.with_extension("tmp");

        {
            let mut file = File::create(&tmp_path)?;
            writeln!(file, "{}", id.as_hex())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;

        #[cfg(unix)]
        {
            if let Some(parent) = path.parent() {
                if let Ok(dir_file) = File::open(parent) {
                    let _ = dir_file.sync_all();
                }
            }
        }

        Ok(())
    }
}
