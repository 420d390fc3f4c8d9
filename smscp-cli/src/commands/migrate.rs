//! Migrate command - provision storage behind the migration key

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{get_context, prompt_secret};

pub fn run(data_dir: &Path, key: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context(data_dir)?;
    let key = match key {
        Some(key) => key,
        None => prompt_secret("Migration key")?,
    };

    let report = ctx.account_service.migrate(&key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.applied.is_empty() {
        println!("{} storage is up to date ({})", "✓".green(), ctx.storage.name());
    } else {
        for name in &report.applied {
            println!("  applied {}", name);
        }
        println!(
            "{} {} migration(s) applied to {}",
            "✓".green(),
            report.applied.len(),
            ctx.storage.name()
        );
    }
    Ok(())
}
