//! CLI command implementations

pub mod dashboard;
pub mod gdpr;
pub mod hook;
pub mod init;
pub mod migrate;
pub mod note;
pub mod user;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::Password;
use smscp_core::SmscpContext;

/// Get the data directory from the command line, environment, or default
pub fn get_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var("SMSCP_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".smscp"))
        .context("Could not find home directory; set SMSCP_DIR")
}

/// Open the smscp context for a data directory
pub fn get_context(data_dir: &Path) -> Result<SmscpContext> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    SmscpContext::new(data_dir).context("Failed to initialize smscp context")
}

/// The capability token a command acts with
pub fn require_token(token: Option<&str>) -> Result<&str> {
    token
        .filter(|t| !t.is_empty())
        .context("No user token. Pass --token or set SMSCP_TOKEN (see 'smscp user login').")
}

/// Read a secret from the terminal without echo
pub fn prompt_secret(prompt: &str) -> Result<String> {
    Ok(Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?)
}
