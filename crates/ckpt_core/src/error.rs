//! Error types for ckpt_core operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ckpt_core operations.
#[derive(Error, Debug)]
pub enum CkptError {
    /// No tracked working tree exists for the given owner/project.
    #[error("repository not found: {owner}/{project}")]
    RepositoryNotFound {
        /// Owner identifier
        owner: String,
        /// Project identifier
        project: String,
    },

    /// No checkpoint record exists for the given id.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// A tracked working tree already exists at the derived path.
    #[error("repository already exists: {owner}/{project}")]
    RepositoryExists {
        /// Owner identifier
        owner: String,
        /// Project identifier
        project: String,
    },

    /// A required field is missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// On-disk state is inconsistent (tree without metadata, index entry without record).
    #[error("corrupt state at {}: {}", path.display(), reason)]
    CorruptState {
        /// Path where the inconsistency was found
        path: PathBuf,
        /// Description of the inconsistency
        reason: String,
    },

    /// A metadata document could not be parsed.
    #[error("invalid metadata at {}: {}", path.display(), reason)]
    InvalidMetadata {
        /// Path to the metadata document
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the version-control backend, message preserved verbatim.
    #[error("version control error: {0}")]
    VersionControl(String),

    /// Object with the given ID was not found in the object store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Hash verification failed during object read.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The expected object ID
        expected: String,
        /// The actual computed hash
        actual: String,
    },

    /// The object file is corrupted or has invalid format.
    #[error("corrupted object at {}: {}", path.display(), reason)]
    CorruptedObject {
        /// Path to the corrupted object
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Another operation holds the repository lock.
    #[error("repository locked by another operation (waited {waited_ms}ms)")]
    RepositoryLocked {
        /// How long acquisition was attempted
        waited_ms: u64,
    },

    /// The caller-supplied deadline passed before the operation finished.
    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(String),

    /// Restore failed after the live tree was touched.
    #[error("restore failed while {phase}: {source}{}", recovery_hint(.safety_checkpoint))]
    RestoreFailed {
        /// Phase in which the failure happened
        phase: String,
        /// Checkpoint holding the pre-restore state, if one was taken
        safety_checkpoint: Option<String>,
        /// Underlying failure
        #[source]
        source: Box<CkptError>,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),
}

fn recovery_hint(safety: &Option<String>) -> String {
    match safety {
        Some(id) => format!(" (pre-restore state is preserved in checkpoint {})", id),
        None => " (no safety checkpoint was taken)".to_string(),
    }
}

/// Stable error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Repository, checkpoint or resource absent.
    NotFound,
    /// Duplicate repository creation.
    AlreadyExists,
    /// Missing or malformed required fields.
    InvalidArgument,
    /// On-disk state inconsistent.
    CorruptState,
    /// Filesystem copy/move errors, lock contention, deadlines.
    IoFailure,
    /// Propagated from the version-control backend.
    VersionControlFailure,
}

impl ErrorCategory {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidArgument => "invalid_argument",
            Self::CorruptState => "corrupt_state",
            Self::IoFailure => "io_failure",
            Self::VersionControlFailure => "version_control_failure",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CkptError {
    /// Maps this error onto the stable category taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RepositoryNotFound { .. } | Self::CheckpointNotFound(_) => ErrorCategory::NotFound,
            Self::RepositoryExists { .. } => ErrorCategory::AlreadyExists,
            Self::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            Self::CorruptState { .. } | Self::InvalidMetadata { .. } => ErrorCategory::CorruptState,
            Self::VersionControl(_)
            | Self::ObjectNotFound(_)
            | Self::HashMismatch { .. }
            | Self::CorruptedObject { .. } => ErrorCategory::VersionControlFailure,
            Self::Io(_)
            | Self::Serialization(_)
            | Self::Compression(_)
            | Self::RepositoryLocked { .. }
            | Self::DeadlineExceeded(_)
            | Self::RestoreFailed { .. }
            | Self::ConfigError(_) => ErrorCategory::IoFailure,
        }
    }

    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::RepositoryNotFound { .. } => {
                Some("Create the repository first with 'ckpt repo create'.")
            }
            Self::CheckpointNotFound(_) => Some("List available checkpoints with 'ckpt checkpoint list'."),
            Self::CorruptState { .. } | Self::InvalidMetadata { .. } => {
                Some("Run 'ckpt verify' to inspect the repository state.")
            }
            Self::CorruptedObject { .. } | Self::HashMismatch { .. } => {
                Some("The tracked history is damaged. Restore from a checkpoint with 'ckpt restore'.")
            }
            Self::RepositoryLocked { .. } => {
                Some("Another operation is running on this repository. Retry once it finishes.")
            }
            Self::RestoreFailed { .. } => {
                Some("Restore the safety checkpoint named in the error with 'ckpt restore --no-backup'.")
            }
            Self::DeadlineExceeded(_) => {
                Some("Raise limits.operation_timeout_secs in config.toml for large trees.")
            }
            _ => None,
        }
    }
}

/// Convenience Result type for ckpt_core operations.
pub type Result<T> = std::result::Result<T, CkptError>;
