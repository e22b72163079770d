//! Garbage collection command.

use super::{format_bytes, App};
use anyhow::Result;
use ckpt_core::{GcOptions, GcReport, ObjectGcReport};
use console::style;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct GcOutput {
    storage: GcReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    objects: Option<ObjectGcReport>,
}

/// Reap abandoned directories, and with `objects` the repository's unreachable objects.
pub fn run(app: &App, dry_run: bool, aggressive: bool, objects: bool, yes: bool) -> Result<()> {
    let options = GcOptions {
        dry_run,
        aggressive,
    };
    let grace_hours = app.svc.config().gc.grace_period_hours;

    if !dry_run && !yes && !app.json {
        println!();
        println!(
            "{} {}",
            style("⚠").yellow().bold(),
            style("WARNING:").yellow().bold()
        );
        println!("  Garbage collection permanently deletes abandoned checkpoint data.");
        if aggressive {
            println!(
                "  {} mode: No grace period - deletes everything unreferenced immediately.",
                style("Aggressive").red()
            );
        } else {
            println!("  Grace period: {} hours", grace_hours);
        }
        println!(
            "  {} Run with {} first to see what would be deleted.",
            style("Tip:").cyan(),
            style("--dry-run").cyan()
        );
        println!();

        print!("Continue with garbage collection? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{} Garbage collection cancelled.", style("✓").green());
            return Ok(());
        }
    }

    let spinner = app.spinner("Reaping abandoned directories...")?;
    let storage = app.svc.gc(options);
    spinner.finish_and_clear();
    let storage = storage?;

    let objects = if objects {
        let handle = app.open_repo()?;
        let spinner = app.spinner("Sweeping unreachable objects...")?;
        let report = app.svc.gc_objects(&handle, options);
        spinner.finish_and_clear();
        Some(report?)
    } else {
        None
    };

    let output = GcOutput { storage, objects };
    app.emit(&output, || print_report(&output, dry_run))
}

fn print_report(output: &GcOutput, dry_run: bool) {
    let storage = &output.storage;
    println!();
    println!("{}", style("Garbage Collection Report:").bold());
    println!(
        "  Staging dirs:        {}",
        style(storage.staging_removed.len()).cyan()
    );
    println!(
        "  Interrupted creates: {}",
        style(storage.init_dirs_removed.len()).cyan()
    );
    println!(
        "  Orphaned checkpoints: {}",
        style(storage.orphaned_checkpoints.len()).cyan()
    );
    for id in &storage.orphaned_checkpoints {
        println!("    {} {}", style("-").dim(), id);
    }

    let mut freed = storage.bytes_freed;
    if let Some(objects) = &output.objects {
        println!(
            "  Objects scanned:     {}",
            style(objects.objects_scanned).cyan()
        );
        println!(
            "  Objects reachable:   {}",
            style(objects.objects_reachable).green()
        );
        println!(
            "  Objects deleted:     {}",
            if objects.objects_deleted > 0 {
                style(objects.objects_deleted).yellow()
            } else {
                style(objects.objects_deleted).green()
            }
        );
        freed += objects.bytes_freed;
    }
    println!("  Bytes freed:         {}", style(format_bytes(freed)).cyan());

    if !storage.errors.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").red().bold());
        for error in &storage.errors {
            println!("  {} {}", style("×").red(), error);
        }
    }

    let removed = storage.removed() + output.objects.as_ref().map_or(0, |o| o.objects_deleted);
    if dry_run && removed > 0 {
        println!();
        println!("This was a dry run. To actually delete, run:");
        println!("  {}", style("ckpt gc").cyan());
    }
}
