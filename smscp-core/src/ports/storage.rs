//! Storage port - the contract every persistence backend satisfies
//!
//! Only equality/range filters, ordering and offset/limit are assumed, so the
//! same contract maps onto a relational table and onto a key-ordered document
//! store. Both adapters are checked against one shared test suite.

use std::time::Duration;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{Note, NotePage, User};

/// Outcome of a gated schema provisioning run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Names of steps applied by this run
    pub applied: Vec<String>,
    /// Steps that were already in place
    pub already_applied: usize,
}

/// Persistence backend
///
/// Every lookup that returns a [`User`] attaches a freshly minted user token;
/// note creation and the full export attach note tokens. Tokens are never
/// stored.
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs ("duckdb", "sled")
    fn name(&self) -> &str;

    // === Schema ===

    /// Provision tables/collections if `supplied_key` matches the configured
    /// migration key. A wrong key returns `Unauthorized` without touching
    /// storage. Safe to call repeatedly.
    fn migrate(&self, supplied_key: &str) -> Result<MigrationReport>;

    // === Users ===

    /// Insert a user. `Conflict` if the username or phone is taken.
    fn user_create(&self, username: &str, password_hash: &str, phone: &str) -> Result<User>;

    /// Resolve a user token against current storage
    fn user_by_token(&self, token: &str) -> Result<User>;

    fn user_by_phone(&self, phone: &str) -> Result<User>;

    fn user_by_username(&self, username: &str) -> Result<User>;

    /// `NotFound` for an unknown username, `Unauthorized` on a bad password
    fn user_login(&self, username: &str, plaintext: &str) -> Result<User>;

    /// Persist username, phone and password hash of an existing user
    fn user_save(&self, user: &User) -> Result<()>;

    /// Remove all of the user's notes, then the user.
    ///
    /// Not atomic: if the second phase fails the notes are already gone and
    /// the error is `PartialDeletion`.
    fn user_delete(&self, user: &User) -> Result<()>;

    // === Notes ===

    fn note_create(&self, user: &User, text: &str) -> Result<Note>;

    /// Zero-based page of notes, newest (highest id) first
    fn note_list_page(&self, user: &User, page_index: usize, page_size: usize) -> Result<NotePage>;

    /// Oldest note by creation time across the user's whole history
    fn note_latest(&self, user: &User) -> Result<Option<Note>>;

    /// Oldest note created within `window` of now
    fn note_latest_within(&self, user: &User, window: Duration) -> Result<Option<Note>>;

    /// Every note, oldest first, each with a note token
    fn user_all_notes(&self, user: &User) -> Result<Vec<Note>>;
}

/// Row offset of a page, rejecting empty pages and overflow
pub fn page_offset(page_index: usize, page_size: usize) -> Result<usize> {
    if page_size == 0 {
        return Err(Error::invalid_input("page size must be at least 1"));
    }
    page_index
        .checked_mul(page_size)
        .ok_or_else(|| Error::invalid_input("page index out of range"))
}

/// Convert a lookback window into a chrono duration
pub fn window_to_chrono(window: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(window)
        .map_err(|_| Error::invalid_input("time window out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(0, 20).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 60);
        assert!(page_offset(1, 0).is_err());
        assert!(page_offset(usize::MAX, 2).is_err());
    }
}
