//! Checkpoint commands.

use super::{format_bytes, format_time, App};
use anyhow::{Context, Result};
use ckpt_core::{Checkpoint, CheckpointList, CheckpointRequest, ContextPayload};
use console::style;
use std::fs;
use std::path::Path;

/// Snapshot the working tree.
pub fn create(app: &App, name: &str, description: &str, context: Option<&Path>) -> Result<()> {
    let mut handle = app.open_repo()?;

    let mut request = CheckpointRequest::new(name).with_description(description);
    if let Some(path) = context {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Context file {} is not valid JSON", path.display()))?;
        request = request.with_context(ContextPayload::new(value));
    }

    let spinner = app.spinner("Copying working tree...")?;
    let result = app.svc.create_checkpoint(&mut handle, request);
    spinner.finish_and_clear();
    let checkpoint = result.context("Failed to create checkpoint")?;

    app.emit(&checkpoint, || {
        println!(
            "{} Created checkpoint {}",
            style("✓").green(),
            style(&checkpoint.id).cyan()
        );
        print_details(&checkpoint);
    })
}

/// List checkpoints in creation order.
pub fn list(app: &App) -> Result<()> {
    let handle = app.open_repo()?;
    let checkpoints = app.svc.list_checkpoints(&handle)?;
    let listing = CheckpointList {
        total: checkpoints.len(),
        checkpoints,
    };

    app.emit(&listing, || {
        if listing.checkpoints.is_empty() {
            println!("No checkpoints yet.");
            return;
        }
        for checkpoint in &listing.checkpoints {
            println!(
                "{}  {}  {}  {}",
                style(&checkpoint.id).cyan(),
                format_time(checkpoint.created_at),
                style(&checkpoint.commit_hash[..8.min(checkpoint.commit_hash.len())]).yellow(),
                checkpoint.name
            );
        }
        println!();
        println!("{} checkpoints", listing.total);
    })
}

/// Show one checkpoint.
pub fn show(app: &App, checkpoint_id: &str) -> Result<()> {
    let checkpoint = app.svc.get_checkpoint(checkpoint_id)?;
    app.emit(&checkpoint, || {
        println!("{} {}", style("Checkpoint").bold(), style(&checkpoint.id).cyan());
        print_details(&checkpoint);
        if !checkpoint.context.is_empty() {
            println!("  Context:");
            let pretty = serde_json::to_string_pretty(checkpoint.context.as_value())
                .unwrap_or_default();
            for line in pretty.lines() {
                println!("    {}", line);
            }
        }
    })
}

fn print_details(checkpoint: &Checkpoint) {
    println!("  Name:        {}", checkpoint.name);
    println!("  Description: {}", checkpoint.description);
    println!(
        "  Repository:  {}/{}",
        checkpoint.owner_id, checkpoint.project_id
    );
    println!("  Created:     {}", format_time(checkpoint.created_at));
    println!(
        "  Commit:      {} {}",
        style(&checkpoint.commit_hash[..8.min(checkpoint.commit_hash.len())]).yellow(),
        checkpoint.commit_message
    );
    println!(
        "  Snapshot:    {} files, {}",
        checkpoint.file_count,
        format_bytes(checkpoint.size_bytes)
    );
}
