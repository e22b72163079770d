//! Initialize a data root.

use super::{print_json, App};
use anyhow::{Context, Result};
use ckpt_core::{ApiResponse, Config, CONFIG_FILE};
use console::style;
use std::path::Path;

/// Writes a default `config.toml` and creates the storage directories.
pub fn run(root: &Path, force: bool, json: bool) -> Result<()> {
    let path = root.join(CONFIG_FILE);
    let existed = path.exists();
    if !existed || force {
        Config::with_root(root)
            .save()
            .context("Failed to write configuration")?;
    }

    let app = App::load(root, "default", None, json)?;
    let health = app.svc.health()?;

    if json {
        return print_json(&ApiResponse::ok(&health));
    }

    if existed && !force {
        println!(
            "{} Configuration already present at {} (use --force to overwrite)",
            style("ℹ").blue(),
            path.display()
        );
    } else {
        println!(
            "{} Initialized data root in {}",
            style("✓").green(),
            root.display()
        );
    }
    println!();
    println!("Directory structure:");
    println!("  {}         - Settings", CONFIG_FILE);
    println!("  repos/<owner>/<project>/ - Working trees and metadata");
    println!("  checkpoints/<id>/        - Immutable snapshots");
    Ok(())
}
