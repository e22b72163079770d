//! Sidecar metadata record kept next to each tracked tree.

use crate::error::{CkptError, Result};
use crate::fsutil::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the record inside the repository directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Persisted state of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub owner_id: String,
    pub project_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// `None` until the first commit made through the commit coordinator.
    #[serde(default)]
    pub last_commit: Option<LastCommit>,
    /// Append-only checkpoint index, oldest first.
    #[serde(default)]
    pub checkpoints: Vec<CheckpointRef>,
}

/// Summary of the most recent commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCommit {
    pub hash: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub files_changed: usize,
}

/// Index entry pointing at a checkpoint record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub commit_hash: String,
}

impl RepositoryMetadata {
    /// A fresh record with no commits and no checkpoints.
    pub fn new(owner_id: &str, project_id: &str, display_name: &str, description: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            project_id: project_id.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            last_commit: None,
            checkpoints: Vec::new(),
        }
    }

    /// Loads the record from `path`.
    ///
    /// # Errors
    ///
    /// `CorruptState` if the record is missing, `InvalidMetadata` if it does
    /// not parse. Metadata is never fabricated.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CkptError::CorruptState {
                path: path.to_path_buf(),
                reason: "tracked tree exists without a metadata record".to_string(),
            });
        }
        read_json(path)
    }

    /// Persists the record atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Looks up an index entry by checkpoint id.
    pub fn checkpoint_ref(&self, id: &str) -> Option<&CheckpointRef> {
        self.checkpoints.iter().find(|r| r.id == id)
    }
}
