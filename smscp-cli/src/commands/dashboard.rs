//! Dashboard command - first page of notes plus the recent one

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{get_context, require_token};
use crate::output;

pub fn run(data_dir: &Path, token: Option<&str>, json: bool) -> Result<()> {
    let token = require_token(token)?;
    let ctx = get_context(data_dir)?;
    let dashboard = ctx.account_service.dashboard(token)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    println!("{} ({})", dashboard.user.username.bold(), dashboard.user.phone);
    println!();

    if let Some(recent) = &dashboard.latest {
        println!("{} {}", "Recent:".cyan(), recent.text);
        println!();
    }

    if dashboard.page.notes.is_empty() {
        output::info("No notes yet. Text your smscp number or run 'smscp note create'.");
    } else {
        println!("{}", output::notes_table(&dashboard.page.notes));
        if dashboard.page.has_more {
            println!("More notes: smscp note list --page 1");
        }
    }
    Ok(())
}
