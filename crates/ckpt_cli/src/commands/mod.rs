//! CLI commands.

pub mod checkpoint;
pub mod commit;
pub mod gc;
pub mod health;
pub mod history;
pub mod init;
pub mod migrate;
pub mod repo;
pub mod restore;
pub mod verify;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use ckpt_core::{ApiResponse, Checkpointer, CkptError, RepositoryHandle};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// State shared by every command.
pub struct App {
    pub svc: Checkpointer,
    pub owner: String,
    project: Option<String>,
    pub json: bool,
}

impl App {
    pub fn load(root: &Path, owner: &str, project: Option<String>, json: bool) -> Result<Self> {
        let svc = Checkpointer::open(root)
            .with_context(|| format!("Failed to load configuration from {}", root.display()))?;
        Ok(Self {
            svc,
            owner: owner.to_string(),
            project,
            json,
        })
    }

    /// Project id, required by repository-scoped commands.
    pub fn project(&self) -> Result<&str> {
        match self.project.as_deref() {
            Some(project) if !project.is_empty() => Ok(project),
            _ => bail!("No project given. Pass --project or set CKPT_PROJECT."),
        }
    }

    pub fn open_repo(&self) -> Result<RepositoryHandle> {
        let project = self.project()?;
        self.svc
            .open_repository(&self.owner, project)
            .with_context(|| format!("Failed to open repository {}/{}", self.owner, project))
    }

    /// Prints `data` as a success envelope in JSON mode, otherwise runs `human`.
    pub fn emit<T: Serialize>(&self, data: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            print_json(&ApiResponse::ok(data))?;
        } else {
            human();
        }
        Ok(())
    }

    /// Spinner on stderr, hidden in JSON mode.
    pub fn spinner(&self, message: &str) -> Result<ProgressBar> {
        if self.json {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Ok(pb)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Local, human-readable rendering of a timestamp.
pub fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Prints a failed command, as an error envelope in JSON mode.
pub fn report_error(err: &anyhow::Error, json: bool) {
    let core = err.chain().find_map(|e| e.downcast_ref::<CkptError>());

    if json {
        let mut envelope: ApiResponse<()> = match core {
            Some(core) => ApiResponse::from_error(core),
            None => ApiResponse {
                success: false,
                data: None,
                error: None,
                error_kind: None,
                status: 500,
            },
        };
        envelope.error = Some(format!("{:#}", err));
        if print_json(&envelope).is_err() {
            eprintln!("{:#}", err);
        }
        return;
    }

    eprintln!("{} {:#}", style("error:").red().bold(), err);
    if let Some(hint) = core.and_then(CkptError::recovery_suggestion) {
        eprintln!("  {} {}", style("hint:").cyan(), hint);
    }
}
