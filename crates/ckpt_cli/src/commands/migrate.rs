//! Context migration command.

use super::App;
use anyhow::{Context, Result};
use ckpt_core::transcript_from_value;
use console::style;
use std::fs;
use std::path::Path;

/// Digest a transcript file and store it as a migration checkpoint.
pub fn run(app: &App, old: &str, new: &str, transcript: &Path) -> Result<()> {
    let text = fs::read_to_string(transcript)
        .with_context(|| format!("Failed to read transcript {}", transcript.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Transcript {} is not valid JSON", transcript.display()))?;
    let messages = transcript_from_value(&value);

    let mut handle = app.open_repo()?;
    let result = app
        .svc
        .migrate_context(&mut handle, old, new, &messages)
        .context("Failed to migrate context")?;

    app.emit(&result, || {
        let digest = &result.digest;
        println!(
            "{} Migrated context into checkpoint {}",
            style("✓").green(),
            style(&result.checkpoint.id).cyan()
        );
        println!("  {}", digest.summary);
        if let Some(kind) = &digest.project_details.project_type {
            println!("  Project type: {}", kind);
        }
        if let Some(framework) = &digest.project_details.framework {
            println!("  Framework:    {}", framework);
        }
        if !digest.key_decisions.is_empty() {
            println!("  Key decisions:");
            for decision in &digest.key_decisions {
                println!(
                    "    {} {}",
                    style(format!("[{}]", decision.kind.as_str())).dim(),
                    decision.content
                );
            }
        }
    })
}
