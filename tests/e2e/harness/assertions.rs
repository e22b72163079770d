use anyhow::Result;
use ckpt_core::{Checkpointer, RepositoryHandle};

/// Declarative assertions on repository state
pub enum Assertion {
    // Working tree
    FileContent { path: String, content: Vec<u8> },
    FileMissing { path: String },
    /// Tree hash equals the one remembered under `label`
    TreeMatches { label: String },

    // Commits
    CommitCount(usize),
    HeadMessageContains(String),
    LastCommitRecorded,
    NoLastCommit,

    // Checkpoints
    CheckpointCount(usize),
    CheckpointNames(Vec<String>),
    LatestCheckpointNameStartsWith(String),

    // Storage
    Consistent,
    NoLeftoverTrees,

    // Custom
    Custom(Box<dyn Fn(&Checkpointer, &RepositoryHandle) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileContent { path, content } => write!(
                f,
                "FileContent {{ path: {:?}, content: {:?} }}",
                path,
                String::from_utf8_lossy(content)
            ),
            Self::FileMissing { path } => write!(f, "FileMissing {{ path: {:?} }}", path),
            Self::TreeMatches { label } => write!(f, "TreeMatches {{ label: {:?} }}", label),
            Self::CommitCount(n) => write!(f, "CommitCount({})", n),
            Self::HeadMessageContains(s) => write!(f, "HeadMessageContains({:?})", s),
            Self::LastCommitRecorded => write!(f, "LastCommitRecorded"),
            Self::NoLastCommit => write!(f, "NoLastCommit"),
            Self::CheckpointCount(n) => write!(f, "CheckpointCount({})", n),
            Self::CheckpointNames(names) => write!(f, "CheckpointNames({:?})", names),
            Self::LatestCheckpointNameStartsWith(s) => {
                write!(f, "LatestCheckpointNameStartsWith({:?})", s)
            }
            Self::Consistent => write!(f, "Consistent"),
            Self::NoLeftoverTrees => write!(f, "NoLeftoverTrees"),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
