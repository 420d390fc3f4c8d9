//! Note domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of code points kept in a note preview
pub const PREVIEW_LEN: usize = 50;

/// A short text note owned by a user. Notes are immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub user_id: u64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Note {
    pub fn new(id: u64, user_id: u64, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            text: text.into(),
            created_at,
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// First [`PREVIEW_LEN`] Unicode code points of the body
    pub fn preview(&self) -> &str {
        match self.text.char_indices().nth(PREVIEW_LEN) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// One page of a user's notes, newest first
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub has_more: bool,
}

impl NotePage {
    /// Build a page from a `page_size + 1` over-fetch.
    ///
    /// The extra row only signals that another page exists; it is dropped.
    pub fn from_overfetch(mut notes: Vec<Note>, page_size: usize) -> Self {
        let has_more = notes.len() > page_size;
        notes.truncate(page_size);
        Self { notes, has_more }
    }
}
