//! Restore command.

use super::App;
use anyhow::{Context, Result};
use ckpt_core::RestoreOptions;
use console::style;

/// Restore the working tree from a checkpoint.
pub fn run(app: &App, checkpoint_id: &str, no_backup: bool) -> Result<()> {
    let mut handle = app.open_repo()?;
    let options = if no_backup {
        RestoreOptions::without_backup()
    } else {
        RestoreOptions::default()
    };

    let spinner = app.spinner("Restoring working tree...")?;
    let result = app.svc.restore(&mut handle, checkpoint_id, options);
    spinner.finish_and_clear();
    let result = result.with_context(|| format!("Failed to restore checkpoint {}", checkpoint_id))?;

    app.emit(&result, || {
        println!("{} {}", style("✓").green(), result.message);
        if let Some(safety) = &result.safety_checkpoint {
            println!(
                "  Previous state saved as {} ({})",
                style(&safety.id).cyan(),
                safety.name
            );
        } else {
            println!("  {}", style("No safety checkpoint was taken.").yellow());
        }
        if result.changed {
            println!(
                "  Recorded as commit {}",
                style(&result.commit_hash[..8.min(result.commit_hash.len())]).yellow()
            );
        }
    })
}
