//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

use smscp_core::Note;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Table of notes showing the preview of each body
pub fn notes_table(notes: &[Note]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Created", "Note"]);
    for note in notes {
        table.add_row(vec![
            note.id.to_string(),
            note.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            note.preview().to_string(),
        ]);
    }
    table
}
