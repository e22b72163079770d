//! Checkpointed project workspaces.
//!
//! Every project owns a version-controlled working tree. On top of its
//! commit history the library keeps immutable, named **checkpoints**: full
//! snapshots of the tree plus an opaque context document, restorable at any
//! time. Restores take a safety checkpoint of the current state first.
//!
//! - Repositories: create, open, per-repository metadata and lock
//! - Commits: staging with `.gitignore`, no-op detection, history
//! - Checkpoints: atomic snapshot + record + index entry
//! - Restore: validated, crash-safe swap of the working tree
//! - Context migration: transcript digests stored as checkpoints
//! - Maintenance: verification, health and garbage collection
//!
//! # Quick Start
//!
//! ```
//! use ckpt_core::{Checkpointer, CheckpointRequest, Config, RestoreOptions};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let svc = Checkpointer::new(Config::with_root(tmp.path()));
//!
//! let mut repo = svc.create_repository("alice", "todo", "Todo", "").unwrap();
//! std::fs::write(repo.tree_root().join("app.js"), "v1").unwrap();
//! let v1 = svc.create_checkpoint(&mut repo, CheckpointRequest::new("v1")).unwrap();
//!
//! std::fs::write(repo.tree_root().join("app.js"), "v2").unwrap();
//! let restored = svc.restore(&mut repo, &v1.id, RestoreOptions::default()).unwrap();
//!
//! assert!(restored.safety_checkpoint.is_some());
//! let text = std::fs::read_to_string(repo.tree_root().join("app.js")).unwrap();
//! assert_eq!(text, "v1");
//! ```
//!
//! # Content-Addressed Storage
//!
//! The embedded backend stores history as BLAKE3-addressed, zstd-compressed
//! objects:
//!
//! ```
//! use ckpt_core::ObjectStore;
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = ObjectStore::new(tmp.path().join("objects"));
//!
//! let id1 = store.put_blob(b"content").unwrap();
//! let id2 = store.put_blob(b"content").unwrap();
//! assert_eq!(id1, id2);
//! assert_eq!(store.get_blob(id1).unwrap(), b"content");
//! ```

mod api;
mod checkpoint;
mod commit;
mod config;
mod digest;
mod error;
mod fsutil;
mod gc;
mod lock;
mod metadata;
mod migration;
mod object_id;
mod object_store;
mod refs;
mod repository;
mod restore;
mod service;
pub mod vcs;
mod verify;

pub use api::{
    status_for, Api, ApiRequest, ApiResponse, CheckpointList, CommitRequest,
    CreateCheckpointRequest, CreateRepositoryRequest, GetCheckpointRequest, HistoryRequest,
    MigrateRequest, RepoRef, RepositoryView, RestoreRequest,
};
pub use checkpoint::{
    generate_checkpoint_id, is_valid_checkpoint_id, Checkpoint, CheckpointRequest,
    ContextPayload, CHECKPOINT_ID_LEN, DEFAULT_CHECKPOINT_DESCRIPTION,
};
pub use commit::{CommitHistory, CommitResult, DEFAULT_COMMIT_MESSAGE, DEFAULT_HISTORY_LIMIT};
pub use config::{
    CommitConfig, Config, DigestConfig, GcConfig, LimitsConfig, StorageConfig, CONFIG_FILE,
};
pub use digest::{
    classify_intent, detect_project_attributes, excerpt, summarize, transcript_from_value,
    ChatDigest, DecisionKind, KeyDecision, ProjectDetails, TranscriptMessage, NO_HISTORY_SUMMARY,
};
pub use error::{CkptError, ErrorCategory, Result};
pub use fsutil::{tree_fingerprint, validate_id};
pub use gc::{GcOptions, GcReport};
pub use lock::{Deadline, RepoLock};
pub use metadata::{CheckpointRef, LastCommit, RepositoryMetadata};
pub use migration::{migration_checkpoint_name, MigrationContext, MigrationResult};
pub use object_id::ObjectId;
pub use object_store::ObjectStore;
pub use repository::{RepositoryHandle, INITIAL_COMMIT_MESSAGE};
pub use restore::{RestoreOptions, RestorePhase, RestoreResult};
pub use service::Checkpointer;
pub use vcs::{
    CommitId, CommitInfo, CommitOutcome, DiffStat, ObjectGcReport, ObjectVcs, Staging,
    TrackedTree, VersionControl,
};
pub use verify::{ConsistencyReport, HealthReport};
