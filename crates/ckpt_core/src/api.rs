//! Request/response envelope for exposing the service over HTTP or JSON.
//!
//! Transport is out of scope: [`Api`] takes deserialized requests and always
//! returns an [`ApiResponse`] whose `status` a server can use verbatim.
//!
//! ```
//! use ckpt_core::{Api, ApiRequest, Checkpointer, Config};
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let api = Api::new(Checkpointer::new(Config::with_root(tmp.path())));
//! let request: ApiRequest = serde_json::from_str(
//!     r#"{"op": "list_checkpoints", "owner_id": "alice", "project_id": "todo"}"#,
//! ).unwrap();
//!
//! let response = api.handle(request);
//! assert!(!response.success);
//! assert_eq!(response.status, 404);
//! ```

use crate::checkpoint::{Checkpoint, CheckpointRequest, ContextPayload};
use crate::commit::{CommitHistory, CommitResult, DEFAULT_HISTORY_LIMIT};
use crate::digest::transcript_from_value;
use crate::error::{CkptError, ErrorCategory, Result};
use crate::metadata::{CheckpointRef, LastCommit};
use crate::migration::MigrationResult;
use crate::repository::RepositoryHandle;
use crate::restore::{RestoreOptions, RestoreResult};
use crate::service::Checkpointer;
use crate::verify::HealthReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

/// HTTP status for an error category.
pub fn status_for(category: ErrorCategory) -> u16 {
    match category {
        ErrorCategory::NotFound => 404,
        ErrorCategory::InvalidArgument | ErrorCategory::AlreadyExists => 400,
        ErrorCategory::CorruptState
        | ErrorCategory::IoFailure
        | ErrorCategory::VersionControlFailure => 500,
    }
}

/// Uniform response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable category name, see [`ErrorCategory::as_str`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub status: u16,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            status: 200,
        }
    }

    pub fn from_error(error: &CkptError) -> Self {
        let category = error.category();
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(category.as_str().to_string()),
            status: status_for(category),
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Erases the payload type.
    pub fn into_json(self) -> ApiResponse<Value> {
        let data = match self.data.map(serde_json::to_value).transpose() {
            Ok(data) => data,
            Err(e) => return ApiResponse::from_error(&CkptError::Serialization(e.to_string())),
        };
        ApiResponse {
            success: self.success,
            data,
            error: self.error,
            error_kind: self.error_kind,
            status: self.status,
        }
    }
}

fn default_owner() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Identifies a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    #[serde(default = "default_owner", alias = "user_id")]
    pub owner_id: String,
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRepositoryRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    #[serde(default, alias = "project_name")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    #[serde(default)]
    pub message: String,
    /// Empty commits the whole tree.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCheckpointRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context: ContextPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCheckpointRequest {
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    pub checkpoint_id: String,
    #[serde(default = "default_true")]
    pub create_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrateRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    #[serde(default)]
    pub old_chat_id: String,
    #[serde(default)]
    pub new_chat_id: String,
    /// Transcript as sent by the client; malformed entries are tolerated.
    #[serde(default)]
    pub chat_history: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    #[serde(flatten)]
    pub repo: RepoRef,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

/// Any request [`Api::handle`] accepts, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    CreateRepository(CreateRepositoryRequest),
    Commit(CommitRequest),
    CreateCheckpoint(CreateCheckpointRequest),
    ListCheckpoints(RepoRef),
    GetCheckpoint(GetCheckpointRequest),
    Restore(RestoreRequest),
    Migrate(MigrateRequest),
    History(HistoryRequest),
    Health,
}

impl ApiRequest {
    /// Operation name, as in the `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            Self::CreateRepository(_) => "create_repository",
            Self::Commit(_) => "commit",
            Self::CreateCheckpoint(_) => "create_checkpoint",
            Self::ListCheckpoints(_) => "list_checkpoints",
            Self::GetCheckpoint(_) => "get_checkpoint",
            Self::Restore(_) => "restore",
            Self::Migrate(_) => "migrate",
            Self::History(_) => "history",
            Self::Health => "health",
        }
    }
}

/// Repository as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryView {
    pub owner_id: String,
    pub project_id: String,
    pub display_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_commit: Option<LastCommit>,
    pub checkpoints: Vec<CheckpointRef>,
    pub path: PathBuf,
}

impl From<&RepositoryHandle> for RepositoryView {
    fn from(handle: &RepositoryHandle) -> Self {
        let meta = handle.metadata();
        Self {
            owner_id: meta.owner_id.clone(),
            project_id: meta.project_id.clone(),
            display_name: meta.display_name.clone(),
            description: meta.description.clone(),
            created_at: meta.created_at,
            last_commit: meta.last_commit.clone(),
            checkpoints: meta.checkpoints.clone(),
            path: handle.tree_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointList {
    pub checkpoints: Vec<Checkpoint>,
    pub total: usize,
}

/// Dispatches requests to a [`Checkpointer`].
#[derive(Debug, Clone)]
pub struct Api {
    service: Checkpointer,
}

impl Api {
    pub fn new(service: Checkpointer) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Checkpointer {
        &self.service
    }

    /// Runs any request and wraps the outcome.
    pub fn handle(&self, request: ApiRequest) -> ApiResponse<Value> {
        let op = request.op();
        debug!(op, "Handling request");
        let response = match request {
            ApiRequest::CreateRepository(req) => self.create_repository(req).into_json(),
            ApiRequest::Commit(req) => self.commit(req).into_json(),
            ApiRequest::CreateCheckpoint(req) => self.create_checkpoint(req).into_json(),
            ApiRequest::ListCheckpoints(req) => self.list_checkpoints(req).into_json(),
            ApiRequest::GetCheckpoint(req) => self.get_checkpoint(req).into_json(),
            ApiRequest::Restore(req) => self.restore(req).into_json(),
            ApiRequest::Migrate(req) => self.migrate(req).into_json(),
            ApiRequest::History(req) => self.history(req).into_json(),
            ApiRequest::Health => self.health().into_json(),
        };
        if !response.success {
            warn!(
                op,
                status = response.status,
                error = response.error.as_deref().unwrap_or_default(),
                "Request failed"
            );
        }
        response
    }

    fn open(&self, repo: &RepoRef) -> Result<RepositoryHandle> {
        self.service.open_repository(&repo.owner_id, &repo.project_id)
    }

    pub fn create_repository(&self, req: CreateRepositoryRequest) -> ApiResponse<RepositoryView> {
        ApiResponse::from_result(
            self.service
                .create_repository(
                    &req.repo.owner_id,
                    &req.repo.project_id,
                    &req.display_name,
                    &req.description,
                )
                .map(|handle| RepositoryView::from(&handle)),
        )
    }

    pub fn commit(&self, req: CommitRequest) -> ApiResponse<CommitResult> {
        ApiResponse::from_result(self.open(&req.repo).and_then(|mut handle| {
            let files = (!req.files.is_empty()).then_some(req.files.as_slice());
            self.service.commit(&mut handle, &req.message, files)
        }))
    }

    pub fn create_checkpoint(&self, req: CreateCheckpointRequest) -> ApiResponse<Checkpoint> {
        ApiResponse::from_result(self.open(&req.repo).and_then(|mut handle| {
            let request = CheckpointRequest::new(req.name)
                .with_description(req.description)
                .with_context(req.context);
            self.service.create_checkpoint(&mut handle, request)
        }))
    }

    pub fn list_checkpoints(&self, repo: RepoRef) -> ApiResponse<CheckpointList> {
        ApiResponse::from_result(self.open(&repo).and_then(|handle| {
            let checkpoints = self.service.list_checkpoints(&handle)?;
            Ok(CheckpointList {
                total: checkpoints.len(),
                checkpoints,
            })
        }))
    }

    pub fn get_checkpoint(&self, req: GetCheckpointRequest) -> ApiResponse<Checkpoint> {
        ApiResponse::from_result(self.service.get_checkpoint(&req.checkpoint_id))
    }

    pub fn restore(&self, req: RestoreRequest) -> ApiResponse<RestoreResult> {
        ApiResponse::from_result(self.open(&req.repo).and_then(|mut handle| {
            let options = if req.create_backup {
                RestoreOptions::default()
            } else {
                RestoreOptions::without_backup()
            };
            self.service.restore(&mut handle, &req.checkpoint_id, options)
        }))
    }

    pub fn migrate(&self, req: MigrateRequest) -> ApiResponse<MigrationResult> {
        if req.old_chat_id.trim().is_empty() || req.new_chat_id.trim().is_empty() {
            return ApiResponse::from_error(&CkptError::InvalidArgument(
                "Both old_chat_id and new_chat_id are required".to_string(),
            ));
        }
        let transcript = transcript_from_value(&req.chat_history);
        ApiResponse::from_result(self.open(&req.repo).and_then(|mut handle| {
            self.service
                .migrate_context(&mut handle, &req.old_chat_id, &req.new_chat_id, &transcript)
        }))
    }

    pub fn history(&self, req: HistoryRequest) -> ApiResponse<CommitHistory> {
        ApiResponse::from_result(
            self.open(&req.repo)
                .and_then(|handle| self.service.history(&handle, req.limit, req.skip)),
        )
    }

    pub fn health(&self) -> ApiResponse<HealthReport> {
        ApiResponse::from_result(self.service.health())
    }
}
