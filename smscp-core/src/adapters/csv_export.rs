//! CSV export of a user's notes

use chrono::SecondsFormat;

use crate::domain::result::{Error, Result};
use crate::domain::{Note, User};
use crate::ports::{ExportDocument, ExportFormatter};

/// Writes the owner record, then one row per note (records are flexible)
///
/// ```text
/// username,phone
/// alice,+15551234567
/// id,created_at,text
/// 1,2024-01-01T00:00:00Z,first note
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExportFormatter;

impl ExportFormatter for CsvExportFormatter {
    fn format(&self, user: &User, notes: &[Note]) -> Result<ExportDocument> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        writer.write_record(["username", "phone"])?;
        writer.write_record([user.username.as_str(), user.phone.as_str()])?;
        writer.write_record(["id", "created_at", "text"])?;
        for note in notes {
            writer.write_record([
                note.id.to_string(),
                note.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                note.text.clone(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::upstream(format!("failed to finish CSV export: {}", e)))?;

        Ok(ExportDocument {
            filename: format!("smscp-{}.csv", user.username),
            content_type: "text/csv".to_string(),
            bytes,
        })
    }
}
