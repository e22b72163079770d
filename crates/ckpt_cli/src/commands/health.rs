//! Storage health command.

use super::App;
use anyhow::{bail, Result};
use console::style;

/// Check that storage is present and writable.
pub fn run(app: &App) -> Result<()> {
    let report = app.svc.health()?;

    app.emit(&report, || {
        if report.healthy {
            println!("{} Storage healthy", style("✓").green());
        } else {
            println!("{} Storage unhealthy", style("✗").red());
            for problem in &report.problems {
                println!("  {} {}", style("×").red(), problem);
            }
        }
        println!("  Repositories: {} ({})", report.repositories, report.repos_dir.display());
        println!("  Checkpoints:  {} ({})", report.checkpoints, report.checkpoints_dir.display());
    })?;

    if !report.healthy && !app.json {
        bail!("storage is not writable");
    }
    Ok(())
}
