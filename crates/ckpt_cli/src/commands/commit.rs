//! Commit command.

use super::App;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

/// Commit the working tree, or only `files` if any are given.
pub fn run(app: &App, message: &str, files: &[PathBuf]) -> Result<()> {
    let mut handle = app.open_repo()?;
    let files = (!files.is_empty()).then_some(files);

    let result = app
        .svc
        .commit(&mut handle, message, files)
        .context("Failed to commit")?;

    app.emit(&result, || {
        if result.changed {
            println!(
                "{} Created commit {}",
                style("✓").green(),
                style(&result.hash[..8.min(result.hash.len())]).yellow()
            );
            println!("  Message: {}", result.message);
            println!(
                "  {} files changed, {} insertions(+), {} deletions(-)",
                result.stats.files,
                style(result.stats.insertions).green(),
                style(result.stats.deletions).red()
            );
        } else {
            println!(
                "{} Nothing to commit, working tree matches {}",
                style("ℹ").blue(),
                style(&result.hash[..8.min(result.hash.len())]).yellow()
            );
        }
    })
}
