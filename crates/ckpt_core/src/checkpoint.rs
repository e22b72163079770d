//! Immutable checkpoints: full snapshots of a working tree plus a record.
//!
//! Layout under the data root:
//!
//! ```text
//! checkpoints/<id>/metadata.json        the Checkpoint record
//! checkpoints/<id>/snapshot/            copy of the tree without .ckpt
//! checkpoints/.staging-<id>-<uuid>/     in-flight creation
//! ```
//!
//! A checkpoint directory appears under its final name only after the copy
//! and record are complete, and the repository index is appended only after
//! that rename. A directory without an index entry is garbage for `gc`; an
//! index entry without a directory is never produced.

use crate::error::{CkptError, Result};
use crate::fsutil::{copy_tree, read_json, remove_dir_best_effort, sync_dir, write_json_atomic};
use crate::lock::Deadline;
use crate::metadata::{CheckpointRef, RepositoryMetadata};
use crate::repository::RepositoryHandle;
use crate::service::Checkpointer;
use crate::vcs::{Staging, TrackedTree};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Hex characters in a checkpoint id.
pub const CHECKPOINT_ID_LEN: usize = 12;
/// Record file inside a checkpoint directory.
pub const RECORD_FILE: &str = "metadata.json";
/// Snapshot directory inside a checkpoint directory.
pub const SNAPSHOT_DIR: &str = "snapshot";
/// Prefix of in-flight checkpoint directories.
pub const STAGING_PREFIX: &str = ".staging-";
/// Description used when the caller gives none.
pub const DEFAULT_CHECKPOINT_DESCRIPTION: &str = "Auto-generated checkpoint";

const MAX_ID_ATTEMPTS: u32 = 16;

/// Caller-supplied structured context, stored and returned without interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextPayload(Value);

impl ContextPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Encodes a typed document.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| CkptError::Serialization(e.to_string()))
    }

    /// Decodes the payload as a typed document.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.0).map_err(|e| CkptError::Serialization(e.to_string()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// True for `null` and `{}`.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl From<Value> for ContextPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Stored checkpoint record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub commit_hash: String,
    pub commit_message: String,
    #[serde(default)]
    pub context: ContextPayload,
    /// Files in the snapshot.
    pub file_count: u64,
    /// Total bytes of file content in the snapshot.
    pub size_bytes: u64,
}

impl Checkpoint {
    /// Index entry for this checkpoint.
    pub fn to_ref(&self) -> CheckpointRef {
        CheckpointRef {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            commit_hash: self.commit_hash.clone(),
        }
    }
}

/// Parameters for creating a checkpoint. Empty fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct CheckpointRequest {
    pub name: String,
    pub description: String,
    pub context: ContextPayload,
    /// Overrides `limits.operation_timeout_secs` for the snapshot copy.
    pub timeout: Option<Duration>,
}

impl CheckpointRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_context(mut self, context: ContextPayload) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Derives a checkpoint id from its identity and creation instant.
///
/// `attempt` disambiguates the rare case of two checkpoints with the same
/// name created in the same instant.
pub fn generate_checkpoint_id(
    owner_id: &str,
    project_id: &str,
    name: &str,
    created_at: DateTime<Utc>,
    attempt: u32,
) -> String {
    let instant = created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let mut hasher = blake3::Hasher::new();
    for part in [owner_id, project_id, name, instant.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&attempt.to_le_bytes());
    hasher.finalize().to_hex().as_str()[..CHECKPOINT_ID_LEN].to_string()
}

/// True if `id` has the shape of a checkpoint id (12 lowercase hex chars).
pub fn is_valid_checkpoint_id(id: &str) -> bool {
    id.len() == CHECKPOINT_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn check_checkpoint_id(id: &str) -> Result<()> {
    if is_valid_checkpoint_id(id) {
        Ok(())
    } else {
        Err(CkptError::InvalidArgument(format!(
            "checkpoint id must be {} lowercase hex characters, got '{}'",
            CHECKPOINT_ID_LEN, id
        )))
    }
}

impl Checkpointer {
    /// Snapshots the working tree into a new checkpoint and indexes it.
    ///
    /// Pending changes are committed first, so the recorded commit always
    /// matches the snapshot.
    pub fn create_checkpoint(
        &self,
        handle: &mut RepositoryHandle,
        request: CheckpointRequest,
    ) -> Result<Checkpoint> {
        let tracked = handle.tracked_tree(self.vcs())?;
        let _lock = self.lock(handle)?;
        self.create_checkpoint_locked(handle, &tracked, request)
    }

    /// Checkpoint body shared with restore. The caller holds the repository lock.
    pub(crate) fn create_checkpoint_locked(
        &self,
        handle: &mut RepositoryHandle,
        tracked: &TrackedTree,
        request: CheckpointRequest,
    ) -> Result<Checkpoint> {
        let deadline = self.deadline(request.timeout);
        let created_at = Utc::now();
        let name = match request.name.trim() {
            "" => format!("checkpoint_{}", created_at.timestamp()),
            name => name.to_string(),
        };
        let description = if request.description.trim().is_empty() {
            DEFAULT_CHECKPOINT_DESCRIPTION.to_string()
        } else {
            request.description
        };

        let commit = self.commit_locked(
            handle,
            tracked,
            &format!("Auto-commit before checkpoint: {}", name),
            &Staging::All,
            &deadline,
        )?;

        let checkpoints_dir = self.config().checkpoints_dir();
        fs::create_dir_all(&checkpoints_dir)?;
        let id = self.unused_checkpoint_id(handle, &name, created_at)?;

        let mut checkpoint = Checkpoint {
            id: id.clone(),
            name,
            description,
            owner_id: handle.owner_id().to_string(),
            project_id: handle.project_id().to_string(),
            created_at,
            commit_hash: commit.hash,
            commit_message: commit.message,
            context: request.context,
            file_count: 0,
            size_bytes: 0,
        };

        let staging = checkpoints_dir.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            id,
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(e) = self.materialize(handle, &staging, &mut checkpoint, &deadline) {
            remove_dir_best_effort(&staging);
            return Err(e);
        }

        handle.update_metadata(|meta| meta.checkpoints.push(checkpoint.to_ref()))?;

        info!(
            id = %checkpoint.id,
            name = %checkpoint.name,
            files = checkpoint.file_count,
            bytes = checkpoint.size_bytes,
            "Created checkpoint"
        );
        Ok(checkpoint)
    }

    fn unused_checkpoint_id(
        &self,
        handle: &RepositoryHandle,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = generate_checkpoint_id(
                handle.owner_id(),
                handle.project_id(),
                name,
                created_at,
                attempt,
            );
            if !self.checkpoint_dir(&id).exists() {
                return Ok(id);
            }
        }
        Err(CkptError::CorruptState {
            path: self.config().checkpoints_dir(),
            reason: format!("no free checkpoint id for '{}'", name),
        })
    }

    /// Copies the tree and writes the record into `staging`, then renames it
    /// to the final checkpoint directory.
    fn materialize(
        &self,
        handle: &RepositoryHandle,
        staging: &Path,
        checkpoint: &mut Checkpoint,
        deadline: &Deadline,
    ) -> Result<()> {
        let stats = copy_tree(
            &handle.tree_root(),
            &staging.join(SNAPSHOT_DIR),
            self.vcs().internal_dir(),
            deadline,
        )?;
        checkpoint.file_count = stats.files;
        checkpoint.size_bytes = stats.bytes;

        deadline.check("checkpoint record")?;
        write_json_atomic(&staging.join(RECORD_FILE), checkpoint)?;

        let final_dir = self.checkpoint_dir(&checkpoint.id);
        fs::rename(staging, &final_dir)?;
        if let Some(parent) = final_dir.parent() {
            sync_dir(parent);
        }
        Ok(())
    }

    /// Checkpoints of a repository in creation order.
    ///
    /// Index entries whose record is missing or unreadable are skipped with a
    /// warning; `verify` reports them.
    pub fn list_checkpoints(&self, handle: &RepositoryHandle) -> Result<Vec<Checkpoint>> {
        let metadata = RepositoryMetadata::load(&handle.metadata_path())?;
        let mut checkpoints = Vec::with_capacity(metadata.checkpoints.len());
        for entry in &metadata.checkpoints {
            match self.get_checkpoint(&entry.id) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => warn!(id = %entry.id, error = %e, "Skipping unreadable checkpoint"),
            }
        }
        Ok(checkpoints)
    }

    /// Loads a checkpoint record by id.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is not a well-formed checkpoint id,
    /// `CheckpointNotFound` if no record exists.
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        check_checkpoint_id(checkpoint_id)?;
        let record = self.checkpoint_dir(checkpoint_id).join(RECORD_FILE);
        if !record.is_file() {
            return Err(CkptError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let checkpoint: Checkpoint = read_json(&record)?;
        if checkpoint.id != checkpoint_id {
            return Err(CkptError::CorruptState {
                path: record,
                reason: format!("record holds checkpoint {}", checkpoint.id),
            });
        }
        Ok(checkpoint)
    }

    /// Directory holding a checkpoint's snapshot.
    pub fn checkpoint_snapshot_dir(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoint_dir(checkpoint_id).join(SNAPSHOT_DIR)
    }
}
