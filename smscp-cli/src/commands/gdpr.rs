//! GDPR commands - export or erase everything stored about the account

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use smscp_core::adapters::csv_export::CsvExportFormatter;
use smscp_core::ErrorKind;

use super::{get_context, require_token};
use crate::output;

#[derive(Subcommand)]
pub enum GdprCommands {
    /// Export the account and all notes as CSV
    Export {
        /// Output file (defaults to the suggested file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete the account and all notes
    Delete {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub fn run(data_dir: &Path, token: Option<&str>, command: GdprCommands) -> Result<()> {
    let token = require_token(token)?;
    let ctx = get_context(data_dir)?;
    let accounts = &ctx.account_service;

    match command {
        GdprCommands::Export { output } => {
            let document = accounts.export_all(token, &CsvExportFormatter)?;
            let path = output.unwrap_or_else(|| PathBuf::from(&document.filename));
            std::fs::write(&path, &document.bytes)?;
            println!("{} Exported to {}", "✓".green(), path.display());
            Ok(())
        }
        GdprCommands::Delete { force } => {
            let user = accounts.current_user(token)?;
            if !force
                && !Confirm::new()
                    .with_prompt(format!(
                        "Permanently delete account '{}' and all of its notes?",
                        user.username
                    ))
                    .default(false)
                    .interact()?
            {
                println!("Cancelled");
                return Ok(());
            }

            match accounts.delete_all(token) {
                Ok(()) => {
                    output::success("Account and notes deleted.");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::PartialFailure => {
                    output::error("Notes were deleted but the account record remains. Run the command again.");
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
