use super::assertions::Assertion;
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use anyhow::{Context, Result};
use ckpt_core::{Checkpointer, ErrorCategory, RepositoryHandle, TranscriptMessage};

/// Fluent DSL for building test scenarios against one repository
pub struct Scenario {
    name: String,
    owner: String,
    project: String,
    initial_files: Vec<(String, Vec<u8>)>,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: "e2e".to_string(),
            project: name.replace(' ', "_"),
            initial_files: Vec::new(),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Add a file to the working tree before the first step
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.initial_files.push((path.to_string(), content.to_vec()));
        self
    }

    // ===== Working tree edits =====

    pub fn writes(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::WriteFile {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    pub fn deletes(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::DeleteFile {
            path: path.to_string(),
        });
        self
    }

    // ===== Operations =====

    pub fn commits(mut self, message: &str) -> Self {
        self.steps.push(ScenarioStep::Commit {
            message: message.to_string(),
            files: None,
        });
        self
    }

    pub fn commits_files(mut self, message: &str, files: &[&str]) -> Self {
        self.steps.push(ScenarioStep::Commit {
            message: message.to_string(),
            files: Some(files.iter().map(|f| f.to_string()).collect()),
        });
        self
    }

    /// Create a checkpoint and remember it (and the tree hash) under `label`
    pub fn checkpoints(mut self, label: &str) -> Self {
        self.steps.push(ScenarioStep::Checkpoint {
            label: label.to_string(),
            name: label.to_string(),
        });
        self
    }

    pub fn restores(mut self, label: &str) -> Self {
        self.steps.push(ScenarioStep::Restore {
            label: label.to_string(),
            backup: true,
        });
        self
    }

    pub fn restores_without_backup(mut self, label: &str) -> Self {
        self.steps.push(ScenarioStep::Restore {
            label: label.to_string(),
            backup: false,
        });
        self
    }

    pub fn migrates(mut self, label: &str, old: &str, new: &str, transcript: Vec<TranscriptMessage>) -> Self {
        self.steps.push(ScenarioStep::Migrate {
            label: label.to_string(),
            old: old.to_string(),
            new: new.to_string(),
            transcript,
        });
        self
    }

    /// Restoring the raw id must fail with `category`
    pub fn restore_fails(mut self, checkpoint_id: &str, category: ErrorCategory) -> Self {
        self.steps.push(ScenarioStep::ExpectFailure {
            step: Box::new(ScenarioStep::RestoreId {
                checkpoint_id: checkpoint_id.to_string(),
                backup: true,
            }),
            category,
        });
        self
    }

    // ===== Crash simulation =====

    pub fn crashes_mid_restore(mut self) -> Self {
        self.steps.push(ScenarioStep::InterruptRestoreSwap);
        self
    }

    pub fn reopens(mut self) -> Self {
        self.steps.push(ScenarioStep::Reopen);
        self
    }

    // ===== Assertions =====

    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    pub fn assert_file(self, path: &str, content: &[u8]) -> Self {
        self.assert(Assertion::FileContent {
            path: path.to_string(),
            content: content.to_vec(),
        })
    }

    pub fn assert_file_missing(self, path: &str) -> Self {
        self.assert(Assertion::FileMissing {
            path: path.to_string(),
        })
    }

    pub fn assert_tree_matches(self, label: &str) -> Self {
        self.assert(Assertion::TreeMatches {
            label: label.to_string(),
        })
    }

    pub fn assert_commit_count(self, count: usize) -> Self {
        self.assert(Assertion::CommitCount(count))
    }

    pub fn assert_head_contains(self, text: &str) -> Self {
        self.assert(Assertion::HeadMessageContains(text.to_string()))
    }

    pub fn assert_checkpoint_count(self, count: usize) -> Self {
        self.assert(Assertion::CheckpointCount(count))
    }

    pub fn assert_checkpoint_names(self, names: &[&str]) -> Self {
        self.assert(Assertion::CheckpointNames(
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    pub fn assert_consistent(self) -> Self {
        self.assert(Assertion::Consistent)
    }

    pub fn assert_custom(
        self,
        check: impl Fn(&Checkpointer, &RepositoryHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.assert(Assertion::Custom(Box::new(check)))
    }

    // ===== Execution =====

    pub fn run(self) -> Result<()> {
        let mut runner = ScenarioRunner::new(&self.owner, &self.project, &self.initial_files)
            .with_context(|| format!("Scenario '{}' setup", self.name))?;
        runner
            .execute(&self.steps)
            .with_context(|| format!("Scenario '{}'", self.name))
    }
}
