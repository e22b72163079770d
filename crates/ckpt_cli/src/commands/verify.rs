//! Repository verification command.

use super::App;
use anyhow::{bail, Result};
use console::style;

/// Check a repository's index, HEAD and working-tree directories.
pub fn run(app: &App) -> Result<()> {
    let handle = app.open_repo()?;

    let spinner = app.spinner("Verifying repository...")?;
    let report = app.svc.verify(&handle);
    spinner.finish_and_clear();
    let report = report?;

    app.emit(&report, || {
        println!();
        println!("{}", style("Verification Report:").bold());
        println!(
            "  Checkpoints checked: {}",
            style(report.checkpoints_checked).cyan()
        );
        match &report.head {
            Some(head) => println!(
                "  HEAD:                {} ({} commits)",
                style(&head[..8.min(head.len())]).yellow(),
                report.commit_count
            ),
            None => println!(
                "  HEAD:                {}",
                style(report.head_error.as_deref().unwrap_or("unreadable")).red()
            ),
        }
        for (label, ids) in [
            ("Dangling refs", &report.dangling_refs),
            ("Foreign refs", &report.foreign_refs),
            ("Missing snapshots", &report.missing_snapshots),
        ] {
            if !ids.is_empty() {
                println!("  {}:", label);
                for id in ids {
                    println!("    {} {}", style("×").red(), id);
                }
            }
        }
        if !report.leftover_trees.is_empty() {
            println!("  Leftover restore trees:");
            for path in &report.leftover_trees {
                println!("    {} {}", style("×").red(), path.display());
            }
        }
        println!();
        if report.has_issues() {
            println!("{} {}", style("✗").red(), report.summary());
        } else {
            println!("{} {}", style("✓").green(), report.summary());
        }
    })?;

    if report.has_issues() && !app.json {
        bail!("{}", report.summary());
    }
    Ok(())
}
