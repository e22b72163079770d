//! History command.

use super::{format_time, App};
use anyhow::Result;
use console::style;

/// Show first-parent history from HEAD.
pub fn run(app: &App, limit: usize, skip: usize) -> Result<()> {
    let handle = app.open_repo()?;
    let history = app.svc.history(&handle, limit, skip)?;

    app.emit(&history, || {
        for commit in &history.commits {
            println!(
                "{} {}",
                style(&commit.short_hash).yellow(),
                commit.message
            );
            println!(
                "  {} | {} | {} files, +{} -{}",
                commit.author,
                format_time(commit.timestamp),
                commit.stats.files,
                commit.stats.insertions,
                commit.stats.deletions
            );
        }
        println!();
        println!(
            "Showing {} of {} commits",
            style(history.commits.len()).cyan(),
            history.total
        );
    })
}
