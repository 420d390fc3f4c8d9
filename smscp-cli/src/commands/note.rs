//! Note commands - post, list and show notes

use std::io::{self, Read};
use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_context, require_token};
use crate::output;

#[derive(Subcommand)]
pub enum NoteCommands {
    /// Post a note (the text is echoed to your phone)
    Create {
        /// Note text; read from stdin when omitted
        text: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List notes, newest first
    List {
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the note returned by the "latest" query
    Latest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(data_dir: &Path, token: Option<&str>, command: NoteCommands) -> Result<()> {
    let token = require_token(token)?;
    let ctx = get_context(data_dir)?;
    let accounts = &ctx.account_service;

    match command {
        NoteCommands::Create { text, json } => {
            let text = match text {
                Some(text) => text,
                None if atty::isnt(atty::Stream::Stdin) => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer.trim().to_string()
                }
                None => anyhow::bail!("No note text provided. Pass it as an argument or pipe it from stdin."),
            };

            let note = accounts.post_note(token, &text)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&note)?);
            } else {
                println!("{} Saved note {}", "✓".green(), note.id);
            }
            Ok(())
        }
        NoteCommands::List { page, json } => {
            let listing = accounts.list_notes(token, page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            if listing.notes.is_empty() {
                output::info("No notes on this page.");
                return Ok(());
            }
            println!("{}", output::notes_table(&listing.notes));
            if listing.has_more {
                println!("More notes: smscp note list --page {}", page + 1);
            }
            Ok(())
        }
        NoteCommands::Latest { json } => {
            let note = accounts.note_latest(token)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&note)?);
                return Ok(());
            }
            match note {
                Some(note) => println!("{}", note.text),
                None => output::info("No notes yet."),
            }
            Ok(())
        }
    }
}
