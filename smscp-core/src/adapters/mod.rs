//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB (relational) and sled (document store) for StorageBackend
//! - Twilio REST API and a logging fallback for NotificationSender
//! - CSV for ExportFormatter

pub mod csv_export;
pub mod duckdb;
pub mod notifier;
pub mod sled;
pub mod twilio;

use tracing::{info, warn};

use crate::domain::result::{Error, Result};
use crate::services::{CredentialHasher, TokenService};

/// Collaborators every storage backend needs to honour the contract
#[derive(Debug, Clone)]
pub struct BackendServices {
    pub tokens: TokenService,
    pub hasher: CredentialHasher,
    pub migration_key: String,
}

impl BackendServices {
    pub fn new(tokens: TokenService, hasher: CredentialHasher, migration_key: impl Into<String>) -> Self {
        Self {
            tokens,
            hasher,
            migration_key: migration_key.into(),
        }
    }

    fn check_migration_key(&self, supplied: &str) -> Result<()> {
        if self.migration_key.is_empty() || supplied != self.migration_key {
            return Err(Error::unauthorized("invalid migration key"));
        }
        Ok(())
    }
}

/// Account deletion shared by both backends
///
/// `delete_notes` runs first and returns how many notes went. An error there
/// is returned as is and `delete_user` never runs. `delete_user` returns
/// whether a user record existed; once notes are gone, its errors become
/// `PartialDeletion`.
fn delete_in_two_phases(
    user_id: u64,
    delete_notes: impl FnOnce() -> Result<usize>,
    delete_user: impl FnOnce() -> Result<bool>,
) -> Result<()> {
    let removed = delete_notes()?;

    match delete_user() {
        Ok(false) => Err(Error::not_found(format!("user {}", user_id))),
        Ok(true) => {
            info!(user_id, notes = removed, "deleted user and notes");
            Ok(())
        }
        Err(source) => {
            warn!(user_id, notes = removed, error = %source, "notes deleted but user record remains");
            Err(Error::PartialDeletion {
                user_id,
                source: Box::new(source),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::domain::result::ErrorKind;

    #[test]
    fn test_note_phase_failure_skips_user_phase() {
        let user_phase_ran = Cell::new(false);
        let err = delete_in_two_phases(
            7,
            || Err(Error::database("notes table unavailable")),
            || {
                user_phase_ran.set(true);
                Ok(true)
            },
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!user_phase_ran.get());
    }

    #[test]
    fn test_user_phase_failure_is_partial_deletion() {
        let err = delete_in_two_phases(7, || Ok(3), || Err(Error::database("disk full"))).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        match err {
            Error::PartialDeletion { user_id, source } => {
                assert_eq!(user_id, 7);
                assert_eq!(source.kind(), ErrorKind::Internal);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_user_is_not_found() {
        let err = delete_in_two_phases(7, || Ok(0), || Ok(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(delete_in_two_phases(7, || Ok(0), || Ok(true)).is_ok());
    }
}
