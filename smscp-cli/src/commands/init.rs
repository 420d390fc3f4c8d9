//! Init command - write the settings file for a data directory

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;
use smscp_core::config::{Backend, Config, SETTINGS_FILE};

use super::prompt_secret;

pub fn run(
    data_dir: &Path,
    backend: Option<Backend>,
    reset_url: Option<String>,
    token_secret: Option<String>,
    migration_key: Option<String>,
) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let mut config = Config::load(data_dir)?;

    if let Some(backend) = backend {
        config.backend = backend;
    }
    if let Some(url) = reset_url {
        config.reset_url_base = url;
    }

    config.token_secret = match token_secret {
        Some(secret) => secret,
        None if config.token_secret.is_empty() => prompt_secret("Token signing secret")?,
        None => config.token_secret,
    };
    config.migration_key = match migration_key {
        Some(key) => key,
        None if config.migration_key.is_empty() => Input::<String>::new()
            .with_prompt("Migration key")
            .interact_text()?,
        None => config.migration_key,
    };

    config.validate()?;
    config.save()?;

    println!(
        "{} Wrote {} ({} backend)",
        "✓".green(),
        data_dir.join(SETTINGS_FILE).display(),
        config.backend
    );
    println!("Next: run 'smscp migrate' to provision storage.");
    Ok(())
}
