//! Repository commands.

use super::{format_time, App};
use anyhow::{Context, Result};
use ckpt_core::RepositoryView;
use console::style;

/// Create and seed a repository.
pub fn create(app: &App, name: &str, description: &str) -> Result<()> {
    let project = app.project()?;
    let handle = app
        .svc
        .create_repository(&app.owner, project, name, description)
        .with_context(|| format!("Failed to create repository {}/{}", app.owner, project))?;

    let view = RepositoryView::from(&handle);
    app.emit(&view, || {
        println!(
            "{} Created repository {}/{}",
            style("✓").green(),
            view.owner_id,
            view.project_id
        );
        println!("  Name:          {}", view.display_name);
        println!("  Working tree:  {}", view.path.display());
    })
}

/// Show repository metadata.
pub fn show(app: &App) -> Result<()> {
    let handle = app.open_repo()?;
    let view = RepositoryView::from(&handle);

    app.emit(&view, || {
        println!(
            "{} {}/{}",
            style(&view.display_name).bold(),
            view.owner_id,
            view.project_id
        );
        if !view.description.is_empty() {
            println!("  {}", view.description);
        }
        println!("  Created:       {}", format_time(view.created_at));
        println!("  Working tree:  {}", view.path.display());
        match &view.last_commit {
            Some(last) => println!(
                "  Last commit:   {} {} ({})",
                style(&last.hash[..8.min(last.hash.len())]).yellow(),
                last.message,
                format_time(last.timestamp)
            ),
            None => println!("  Last commit:   {}", style("none").dim()),
        }
        println!("  Checkpoints:   {}", style(view.checkpoints.len()).cyan());
    })
}
