use super::assertions::Assertion;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, ensure, Context, Result};
use ckpt_core::{CheckpointRequest, CkptError, RepositoryHandle, RestoreOptions};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Executes scenario steps against one repository
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    owner: String,
    project: String,
    handle: RepositoryHandle,
    /// label -> checkpoint id
    checkpoints: HashMap<String, String>,
    /// label -> tree hash when the checkpoint was taken
    tree_hashes: HashMap<String, String>,
}

impl ScenarioRunner {
    pub fn new(owner: &str, project: &str, initial_files: &[(String, Vec<u8>)]) -> Result<Self> {
        let workspace = TestWorkspace::empty()?;
        let handle = workspace.create_repo(owner, project)?;
        for (path, content) in initial_files {
            workspace.write_file(&handle, path, content)?;
        }
        Ok(Self {
            workspace,
            owner: owner.to_string(),
            project: project.to_string(),
            handle,
            checkpoints: HashMap::new(),
            tree_hashes: HashMap::new(),
        })
    }

    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::WriteFile { path, content } => {
                self.workspace.write_file(&self.handle, path, content)
            }
            ScenarioStep::DeleteFile { path } => self.workspace.delete_file(&self.handle, path),
            ScenarioStep::Assert { assertion } => self.check(assertion),
            ScenarioStep::InterruptRestoreSwap => self.interrupt_restore_swap(),
            ScenarioStep::Reopen => {
                self.handle = self.workspace.open_repo(&self.owner, &self.project)?;
                Ok(())
            }
            ScenarioStep::ExpectFailure { step, category } => match self.run_operation(step) {
                Ok(()) => bail!("Expected {} failure, but {:?} succeeded", category, step),
                Err(err) => {
                    let core = err
                        .downcast_ref::<CkptError>()
                        .ok_or_else(|| anyhow!("Expected a checkpoint error, got: {:#}", err))?;
                    ensure!(
                        core.category() == *category,
                        "Expected {} failure, got {} ({})",
                        category,
                        core.category(),
                        core
                    );
                    Ok(())
                }
            },
            operation => self.run_operation(operation),
        }
    }

    /// Steps that call into the service; errors keep their `CkptError` type.
    fn run_operation(&mut self, step: &ScenarioStep) -> Result<()> {
        let svc = self.workspace.service();
        match step {
            ScenarioStep::Commit { message, files } => {
                let files: Option<Vec<PathBuf>> = files
                    .as_ref()
                    .map(|files| files.iter().map(PathBuf::from).collect());
                svc.commit(&mut self.handle, message, files.as_deref())?;
            }
            ScenarioStep::Checkpoint { label, name } => {
                let checkpoint = svc.create_checkpoint(&mut self.handle, CheckpointRequest::new(name))?;
                let hash = self.workspace.tree_hash(&self.handle)?;
                self.checkpoints.insert(label.clone(), checkpoint.id);
                self.tree_hashes.insert(label.clone(), hash);
            }
            ScenarioStep::Restore { label, backup } => {
                let id = self.checkpoint_id(label)?;
                svc.restore(&mut self.handle, &id, restore_options(*backup))?;
            }
            ScenarioStep::RestoreId {
                checkpoint_id,
                backup,
            } => {
                svc.restore(&mut self.handle, checkpoint_id, restore_options(*backup))?;
            }
            ScenarioStep::Migrate {
                label,
                old,
                new,
                transcript,
            } => {
                let result = svc.migrate_context(&mut self.handle, old, new, transcript)?;
                self.checkpoints.insert(label.clone(), result.checkpoint.id);
            }
            other => bail!("{:?} is not an operation", other),
        }
        Ok(())
    }

    fn checkpoint_id(&self, label: &str) -> Result<String> {
        self.checkpoints
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow!("No checkpoint labelled '{}'", label))
    }

    /// Leaves the state of a restore killed right after the live tree was
    /// moved aside: no live tree, the displaced tree and a half-copied snapshot.
    fn interrupt_restore_swap(&mut self) -> Result<()> {
        let repo_dir = self.handle.repo_dir().to_path_buf();
        let live = self.handle.tree_root();
        fs::rename(&live, repo_dir.join("tree.old-crashed"))
            .context("Failed to move the live tree aside")?;

        let incoming = repo_dir.join("tree.restore-crashed");
        fs::create_dir_all(&incoming)?;
        fs::write(incoming.join("partial.txt"), b"half copied")?;
        Ok(())
    }

    fn check(&mut self, assertion: &Assertion) -> Result<()> {
        self.handle.refresh()?;
        let ws = &self.workspace;
        let svc = ws.service();
        let handle = &self.handle;

        match assertion {
            Assertion::FileContent { path, content } => {
                let actual = ws.read_file(handle, path)?;
                ensure!(
                    &actual == content,
                    "File {} contains {:?}, expected {:?}",
                    path,
                    String::from_utf8_lossy(&actual),
                    String::from_utf8_lossy(content)
                );
            }
            Assertion::FileMissing { path } => {
                ensure!(!ws.file_exists(handle, path), "File {} should not exist", path);
            }
            Assertion::TreeMatches { label } => {
                let expected = self
                    .tree_hashes
                    .get(label)
                    .ok_or_else(|| anyhow!("No tree hash labelled '{}'", label))?;
                let actual = ws.tree_hash(handle)?;
                ensure!(
                    &actual == expected,
                    "Tree differs from the state checkpointed as '{}'",
                    label
                );
            }
            Assertion::CommitCount(expected) => {
                let total = svc.history(handle, 1, 0)?.total;
                ensure!(total == *expected, "Expected {} commits, found {}", expected, total);
            }
            Assertion::HeadMessageContains(text) => {
                let history = svc.history(handle, 1, 0)?;
                let head = history
                    .commits
                    .first()
                    .ok_or_else(|| anyhow!("History is empty"))?;
                ensure!(
                    head.message.contains(text.as_str()),
                    "HEAD message {:?} does not contain {:?}",
                    head.message,
                    text
                );
            }
            Assertion::LastCommitRecorded => {
                ensure!(handle.last_commit().is_some(), "Expected a recorded last commit");
            }
            Assertion::NoLastCommit => {
                ensure!(
                    handle.last_commit().is_none(),
                    "Expected no last commit, found {:?}",
                    handle.last_commit()
                );
            }
            Assertion::CheckpointCount(expected) => {
                let listed = svc.list_checkpoints(handle)?.len();
                ensure!(
                    listed == *expected,
                    "Expected {} checkpoints, found {}",
                    expected,
                    listed
                );
                ensure!(
                    handle.checkpoint_refs().len() == *expected,
                    "Index holds {} entries, expected {}",
                    handle.checkpoint_refs().len(),
                    expected
                );
            }
            Assertion::CheckpointNames(expected) => {
                let names: Vec<String> = svc
                    .list_checkpoints(handle)?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                ensure!(&names == expected, "Checkpoint names {:?}, expected {:?}", names, expected);
            }
            Assertion::LatestCheckpointNameStartsWith(prefix) => {
                let latest = svc
                    .list_checkpoints(handle)?
                    .pop()
                    .ok_or_else(|| anyhow!("No checkpoints"))?;
                ensure!(
                    latest.name.starts_with(prefix.as_str()),
                    "Latest checkpoint {:?} does not start with {:?}",
                    latest.name,
                    prefix
                );
            }
            Assertion::Consistent => {
                let report = svc.verify(handle)?;
                ensure!(!report.has_issues(), "Inconsistent: {}", report.summary());
            }
            Assertion::NoLeftoverTrees => {
                for entry in fs::read_dir(handle.repo_dir())? {
                    let name = entry?.file_name().to_string_lossy().into_owned();
                    ensure!(
                        !name.starts_with("tree.old-") && !name.starts_with("tree.restore-"),
                        "Leftover tree directory: {}",
                        name
                    );
                }
            }
            Assertion::Custom(check) => check(svc, handle)?,
        }
        Ok(())
    }
}

fn restore_options(backup: bool) -> RestoreOptions {
    if backup {
        RestoreOptions::default()
    } else {
        RestoreOptions::without_backup()
    }
}
