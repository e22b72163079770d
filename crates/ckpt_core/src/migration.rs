//! Carrying a chat session's context into a new session as a checkpoint.

use crate::checkpoint::{Checkpoint, CheckpointRequest, ContextPayload};
use crate::digest::{summarize, ChatDigest, TranscriptMessage};
use crate::error::{CkptError, Result};
use crate::repository::RepositoryHandle;
use crate::service::Checkpointer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Context document stored on a migration checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationContext {
    pub old_session_id: String,
    pub new_session_id: String,
    pub chat_digest: ChatDigest,
    pub migration_timestamp: DateTime<Utc>,
    /// Messages in the transcript, including those the digest dropped.
    pub full_history_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub old_session_id: String,
    pub new_session_id: String,
    pub digest: ChatDigest,
    pub checkpoint: Checkpoint,
}

/// Checkpoint name for a migration between two sessions.
pub fn migration_checkpoint_name(old_session_id: &str, new_session_id: &str) -> String {
    format!("context_migration_{}_to_{}", old_session_id, new_session_id)
}

impl Checkpointer {
    /// Digests `transcript` and stores it on a new checkpoint of the project.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if either session id is blank; nothing is written in
    /// that case. Checkpoint creation errors propagate unchanged.
    pub fn migrate_context(
        &self,
        handle: &mut RepositoryHandle,
        old_session_id: &str,
        new_session_id: &str,
        transcript: &[TranscriptMessage],
    ) -> Result<MigrationResult> {
        for (field, value) in [("old_session_id", old_session_id), ("new_session_id", new_session_id)] {
            if value.trim().is_empty() {
                return Err(CkptError::InvalidArgument(format!("{} must not be empty", field)));
            }
        }

        let digest = summarize(transcript, &self.config().digest);
        let context = MigrationContext {
            old_session_id: old_session_id.to_string(),
            new_session_id: new_session_id.to_string(),
            chat_digest: digest.clone(),
            migration_timestamp: Utc::now(),
            full_history_length: transcript.len(),
        };

        let request = CheckpointRequest::new(migration_checkpoint_name(old_session_id, new_session_id))
            .with_description(format!(
                "Context migration from chat {} to {}",
                old_session_id, new_session_id
            ))
            .with_context(ContextPayload::from_typed(&context)?);
        let checkpoint = self.create_checkpoint(handle, request)?;

        info!(
            old = old_session_id,
            new = new_session_id,
            messages = transcript.len(),
            checkpoint = %checkpoint.id,
            "Migrated context"
        );
        Ok(MigrationResult {
            old_session_id: context.old_session_id,
            new_session_id: context.new_session_id,
            digest,
            checkpoint,
        })
    }
}
