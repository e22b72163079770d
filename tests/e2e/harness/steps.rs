use super::assertions::Assertion;
use ckpt_core::{ErrorCategory, TranscriptMessage};

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Working tree edits
    WriteFile {
        path: String,
        content: Vec<u8>,
    },
    DeleteFile {
        path: String,
    },

    // Service operations
    Commit {
        message: String,
        files: Option<Vec<String>>,
    },
    Checkpoint {
        label: String,
        name: String,
    },
    Restore {
        label: String,
        backup: bool,
    },
    Migrate {
        label: String,
        old: String,
        new: String,
        transcript: Vec<TranscriptMessage>,
    },

    /// Run an operation that must fail with the given category
    ExpectFailure {
        step: Box<ScenarioStep>,
        category: ErrorCategory,
    },

    /// Restore by raw id rather than label
    RestoreId {
        checkpoint_id: String,
        backup: bool,
    },

    // Crash simulation
    /// Leave the repository as a crash in the middle of a restore swap would
    InterruptRestoreSwap,
    /// Drop the handle and open the repository again
    Reopen,

    // Verification
    Assert {
        assertion: Assertion,
    },
}
