//! DuckDB storage backend (relational)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use tracing::{debug, info, warn};

use super::{delete_in_two_phases, BackendServices};
use crate::domain::result::{Error, Result};
use crate::domain::{EntityKind, Note, NotePage, User};
use crate::ports::storage::{page_offset, window_to_chrono};
use crate::ports::{MigrationReport, StorageBackend};
use crate::services::MigrationService;

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const USER_COLUMNS: &str = "id, username, phone, password_hash";
const NOTE_COLUMNS: &str = "id, user_id, text, created_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Map uniqueness violations to `Conflict`, everything else to `Database`
fn constraint_error(err: duckdb::Error, what: &str) -> Error {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("duplicate key") || lower.contains("unique constraint") {
        Error::conflict(format!("{} already exists", what))
    } else {
        Error::database(msg)
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::database(format!("timestamp out of range: {}", micros)))
}

fn row_to_user(row: &duckdb::Row) -> duckdb::Result<User> {
    Ok(User::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
}

fn row_to_note(row: &duckdb::Row) -> duckdb::Result<(u64, u64, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn note_from_parts((id, user_id, text, created_at): (u64, u64, String, i64)) -> Result<Note> {
    Ok(Note::new(id, user_id, text, from_micros(created_at)?))
}

/// DuckDB storage backend
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    services: BackendServices,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff on file locking errors, which happen
    /// when another process holds the file briefly.
    pub fn open(db_path: &Path, services: BackendServices) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        services,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error
            .map(Error::from)
            .unwrap_or_else(|| Error::database(format!("failed to open database after {} retries", MAX_RETRIES))))
    }

    /// Private in-memory database, used by tests and throwaway runs
    pub fn open_in_memory(services: BackendServices) -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            services,
        })
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading pulls cached binaries from ~/.duckdb; not needed here
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("connection mutex poisoned"))
    }

    fn with_user_token(&self, user: User) -> Result<User> {
        let token = self.services.tokens.user_token(user.id)?;
        Ok(user.with_token(token))
    }

    fn find_user(&self, column: &str, value: &dyn duckdb::ToSql) -> Result<Option<User>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        Ok(conn.query_row(&sql, [value], row_to_user).optional()?)
    }

    fn user_by(&self, column: &str, value: &dyn duckdb::ToSql, what: &str) -> Result<User> {
        let user = self
            .find_user(column, value)?
            .ok_or_else(|| Error::not_found(what.to_string()))?;
        self.with_user_token(user)
    }

    fn query_notes(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Note>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_note)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(note_from_parts(row?)?);
        }
        Ok(notes)
    }
}

impl StorageBackend for DuckDbStore {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn migrate(&self, supplied_key: &str) -> Result<MigrationReport> {
        self.services.check_migration_key(supplied_key)?;
        let conn = self.lock()?;
        let report = MigrationService::new(&conn).run_pending()?;
        info!(
            backend = "duckdb",
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "schema migration finished"
        );
        Ok(report)
    }

    fn user_create(&self, username: &str, password_hash: &str, phone: &str) -> Result<User> {
        let now = Utc::now().timestamp_micros();
        let id: u64 = {
            let conn = self.lock()?;

            // Explicit checks give a precise message; the UNIQUE constraints
            // still catch concurrent inserts.
            let taken: Option<String> = conn
                .query_row(
                    "SELECT CASE WHEN username = ? THEN 'username' ELSE 'phone' END
                     FROM users WHERE username = ? OR phone = ? LIMIT 1",
                    params![username, username, phone],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(field) = taken {
                return Err(Error::conflict(format!("{} already registered", field)));
            }

            conn.query_row(
                "INSERT INTO users (username, password_hash, phone, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
                params![username, password_hash, phone, now, now],
                |row| row.get(0),
            )
            .map_err(|e| constraint_error(e, "username or phone"))?
        };

        debug!(user_id = id, "created user row");
        self.with_user_token(User::new(id, username, phone, password_hash))
    }

    fn user_by_token(&self, token: &str) -> Result<User> {
        let id = self.services.tokens.resolve(token, EntityKind::User)?;
        let user = self
            .find_user("id", &id)?
            .ok_or_else(|| Error::not_found(format!("user {}", id)))?;
        self.with_user_token(user)
    }

    fn user_by_phone(&self, phone: &str) -> Result<User> {
        self.user_by("phone", &phone, "no user with that phone number")
    }

    fn user_by_username(&self, username: &str) -> Result<User> {
        self.user_by("username", &username, "no user with that username")
    }

    fn user_login(&self, username: &str, plaintext: &str) -> Result<User> {
        let user = self
            .find_user("username", &username)?
            .ok_or_else(|| Error::not_found("no user with that username"))?;
        self.services.hasher.compare(plaintext, &user.password_hash)?;
        self.with_user_token(user)
    }

    fn user_save(&self, user: &User) -> Result<()> {
        let now = Utc::now().timestamp_micros();
        let current = self
            .find_user("id", &user.id)?
            .ok_or_else(|| Error::not_found(format!("user {}", user.id)))?;

        // Only touch changed columns: rewriting an unchanged UNIQUE value can
        // trip DuckDB's index checks.
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn duckdb::ToSql> = Vec::new();
        if user.username != current.username {
            sets.push("username = ?");
            values.push(&user.username);
        }
        if user.phone != current.phone {
            sets.push("phone = ?");
            values.push(&user.phone);
        }
        if user.password_hash != current.password_hash {
            sets.push("password_hash = ?");
            values.push(&user.password_hash);
        }
        if sets.is_empty() {
            return Ok(());
        }

        sets.push("updated_at = ?");
        values.push(&now);
        values.push(&user.id);

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        conn.execute(&sql, values.as_slice())
            .map_err(|e| constraint_error(e, "username or phone"))?;
        Ok(())
    }

    fn user_delete(&self, user: &User) -> Result<()> {
        let conn = self.lock()?;

        // Each statement auto-commits, so the phases are separate writes
        delete_in_two_phases(
            user.id,
            || Ok(conn.execute("DELETE FROM notes WHERE user_id = ?", params![user.id])?),
            || Ok(conn.execute("DELETE FROM users WHERE id = ?", params![user.id])? > 0),
        )
    }

    fn note_create(&self, user: &User, text: &str) -> Result<Note> {
        let created_at = Utc::now().timestamp_micros();
        let id: u64 = {
            let conn = self.lock()?;
            conn.query_row(
                "INSERT INTO notes (user_id, text, created_at) VALUES (?, ?, ?) RETURNING id",
                params![user.id, text, created_at],
                |row| row.get(0),
            )?
        };

        let note = Note::new(id, user.id, text, from_micros(created_at)?);
        let token = self.services.tokens.note_token(id)?;
        Ok(note.with_token(token))
    }

    fn note_list_page(&self, user: &User, page_index: usize, page_size: usize) -> Result<NotePage> {
        let offset = page_offset(page_index, page_size)? as u64;
        let limit = page_size as u64 + 1;
        let sql = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
            NOTE_COLUMNS
        );
        let notes = self.query_notes(&sql, &[&user.id, &limit, &offset])?;
        Ok(NotePage::from_overfetch(notes, page_size))
    }

    fn note_latest(&self, user: &User) -> Result<Option<Note>> {
        let sql = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY created_at ASC, id ASC LIMIT 1",
            NOTE_COLUMNS
        );
        Ok(self.query_notes(&sql, &[&user.id])?.into_iter().next())
    }

    fn note_latest_within(&self, user: &User, window: Duration) -> Result<Option<Note>> {
        let cutoff = (Utc::now() - window_to_chrono(window)?).timestamp_micros();
        let sql = format!(
            "SELECT {} FROM notes WHERE user_id = ? AND created_at >= ?
             ORDER BY created_at ASC, id ASC LIMIT 1",
            NOTE_COLUMNS
        );
        Ok(self.query_notes(&sql, &[&user.id, &cutoff])?.into_iter().next())
    }

    fn user_all_notes(&self, user: &User) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY id ASC",
            NOTE_COLUMNS
        );
        self.query_notes(&sql, &[&user.id])?
            .into_iter()
            .map(|note| {
                let token = self.services.tokens.note_token(note.id)?;
                Ok(note.with_token(token))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ErrorKind;
    use crate::domain::Argon2Params;
    use crate::services::{CredentialHasher, TokenService};

    fn store() -> DuckDbStore {
        let services = BackendServices::new(
            TokenService::new("secret"),
            CredentialHasher::new(Argon2Params::minimal()),
            "mkey",
        );
        DuckDbStore::open_in_memory(services).unwrap()
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(!is_retryable_error("Catalog Error: table missing"));
    }

    #[test]
    fn test_wrong_key_leaves_database_empty() {
        let store = store();
        let err = store.migrate("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let conn = store.lock().unwrap();
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM information_schema.tables", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_operations_fail_before_migration() {
        let store = store();
        let err = store.user_create("alice", "hash", "1555").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_update_with_unchanged_fields_is_noop() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("alice", "hash", "1555").unwrap();
        store.user_save(&user).unwrap();

        let mut renamed = user.clone();
        renamed.username = "alicia".into();
        store.user_save(&renamed).unwrap();
        assert_eq!(store.user_by_username("alicia").unwrap().id, user.id);
        assert_eq!(store.user_by_phone("1555").unwrap().username, "alicia");
    }

    #[test]
    fn test_timestamps_round_trip_through_micros() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("bob", "hash", "1666").unwrap();
        let created = store.note_create(&user, "hello").unwrap();
        let listed = store.note_list_page(&user, 0, 10).unwrap();
        assert_eq!(listed.notes[0].created_at, created.created_at);
    }

    fn count(store: &DuckDbStore, sql: &str) -> i64 {
        store.lock().unwrap().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_failed_note_phase_keeps_user() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("carol", "hash", "1777").unwrap();
        store.lock().unwrap().execute_batch("DROP TABLE notes").unwrap();

        let err = store.user_delete(&user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(store.user_by_token(user.token().unwrap()).unwrap().id, user.id);
    }

    #[test]
    fn test_failed_user_phase_reports_partial_deletion() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("dave", "hash", "1888").unwrap();
        store.note_create(&user, "one").unwrap();
        store.note_create(&user, "two").unwrap();

        // Keep the rows around under another name so the user phase has nothing to hit
        store
            .lock()
            .unwrap()
            .execute_batch("CREATE TABLE users_kept AS SELECT * FROM users; DROP TABLE users;")
            .unwrap();

        let err = store.user_delete(&user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(matches!(err, Error::PartialDeletion { user_id, .. } if user_id == user.id));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM notes"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM users_kept"), 1);
    }
}
