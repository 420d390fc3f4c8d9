//! Export port - turns a user's data into a downloadable document

use crate::domain::result::Result;
use crate::domain::{Note, User};

/// A generated export file
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Formats the full data of one user
pub trait ExportFormatter: Send + Sync {
    fn format(&self, user: &User, notes: &[Note]) -> Result<ExportDocument>;
}
