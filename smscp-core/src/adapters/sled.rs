//! sled storage backend (document store)
//!
//! Collections are sled trees holding JSON documents:
//!
//! - `users`: key = user id (big-endian u64)
//! - `notes`: key = owner id ‖ note id (both big-endian), so a prefix scan
//!   yields one user's notes in id order
//! - `users_by_username`, `users_by_phone`: unique indexes, value = user id
//! - `meta`: provisioning marker written by `migrate`
//!
//! A user document and its index entries are always written in one
//! transaction over `users`, `users_by_username` and `users_by_phone`, so an
//! index entry never outlives or precedes its document.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionError, TransactionResult,
    TransactionalTree,
};
use sled::{Batch, Db, IVec, Transactional, Tree};
use tracing::{debug, info, warn};

use super::{delete_in_two_phases, BackendServices};
use crate::domain::result::{Error, Result};
use crate::domain::{EntityKind, Note, NotePage, User};
use crate::ports::storage::{page_offset, window_to_chrono};
use crate::ports::{MigrationReport, StorageBackend};

const USERS: &str = "users";
const NOTES: &str = "notes";
const USERS_BY_USERNAME: &str = "users_by_username";
const USERS_BY_PHONE: &str = "users_by_phone";
const META: &str = "meta";

const SCHEMA_KEY: &[u8] = b"schema_version";
const SCHEMA_VERSION: u32 = 1;

const COLLECTIONS: &[&str] = &[USERS, NOTES, USERS_BY_USERNAME, USERS_BY_PHONE];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    id: u64,
    username: String,
    phone: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        User::new(doc.id, doc.username, doc.phone, doc.password_hash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteDocument {
    id: u64,
    user_id: u64,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<NoteDocument> for Note {
    fn from(doc: NoteDocument) -> Self {
        Note::new(doc.id, doc.user_id, doc.text, doc.created_at)
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn note_key(user_id: u64, note_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user_id.to_be_bytes());
    key[8..].copy_from_slice(&note_id.to_be_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::database("corrupt id in index"))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &IVec) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn from_transaction(err: TransactionError<Error>) -> Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

fn decode_in_tx<T: for<'de> Deserialize<'de>>(bytes: &IVec) -> ConflictableTransactionResult<T, Error> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

/// Drop an index entry, but only if it still points at `id`
fn release_entry(index: &TransactionalTree, value: &str, id: u64) -> ConflictableTransactionResult<(), Error> {
    if index.get(value.as_bytes())?.as_deref() == Some(&id_key(id)[..]) {
        index.remove(value.as_bytes())?;
    }
    Ok(())
}

/// Collection handles, only available once the store is provisioned
struct Collections {
    users: Tree,
    notes: Tree,
    by_username: Tree,
    by_phone: Tree,
}

/// sled storage backend
pub struct SledStore {
    db: Db,
    services: BackendServices,
}

impl SledStore {
    /// Open (or create) a store in a directory
    pub fn open(path: &Path, services: BackendServices) -> Result<Self> {
        Ok(Self {
            db: sled::open(path)?,
            services,
        })
    }

    /// Store that is deleted when dropped, used by tests and throwaway runs
    pub fn temporary(services: BackendServices) -> Result<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
            services,
        })
    }

    fn is_provisioned(&self) -> Result<bool> {
        Ok(self.db.open_tree(META)?.contains_key(SCHEMA_KEY)?)
    }

    fn collections(&self) -> Result<Collections> {
        if !self.is_provisioned()? {
            return Err(Error::database("document store is not provisioned; run migrate first"));
        }
        Ok(Collections {
            users: self.db.open_tree(USERS)?,
            notes: self.db.open_tree(NOTES)?,
            by_username: self.db.open_tree(USERS_BY_USERNAME)?,
            by_phone: self.db.open_tree(USERS_BY_PHONE)?,
        })
    }

    fn next_id(&self) -> Result<u64> {
        // generate_id starts at 0; identities start at 1 like the relational side
        Ok(self.db.generate_id()? + 1)
    }

    fn with_user_token(&self, user: User) -> Result<User> {
        let token = self.services.tokens.user_token(user.id)?;
        Ok(user.with_token(token))
    }

    fn load_user(&self, cols: &Collections, id: u64) -> Result<Option<UserDocument>> {
        cols.users.get(id_key(id))?.map(|bytes| decode(&bytes)).transpose()
    }

    fn user_by_index(&self, index: &Tree, cols: &Collections, value: &str, what: &str) -> Result<User> {
        let id = index
            .get(value.as_bytes())?
            .ok_or_else(|| Error::not_found(what.to_string()))?;
        let doc = self
            .load_user(cols, decode_id(&id)?)?
            .ok_or_else(|| Error::not_found(what.to_string()))?;
        self.with_user_token(doc.into())
    }

    fn scan_notes(&self, cols: &Collections, user_id: u64) -> impl DoubleEndedIterator<Item = Result<Note>> {
        cols.notes
            .scan_prefix(user_id.to_be_bytes())
            .map(|entry| {
                let (_, bytes) = entry?;
                Ok(decode::<NoteDocument>(&bytes)?.into())
            })
    }

    /// Earliest note by (created_at, id) among those passing `keep`
    fn oldest_note(&self, user: &User, keep: impl Fn(&Note) -> bool) -> Result<Option<Note>> {
        let cols = self.collections()?;
        let mut oldest: Option<Note> = None;
        for note in self.scan_notes(&cols, user.id) {
            let note = note?;
            if !keep(&note) {
                continue;
            }
            let earlier = match &oldest {
                Some(current) => (note.created_at, note.id) < (current.created_at, current.id),
                None => true,
            };
            if earlier {
                oldest = Some(note);
            }
        }
        Ok(oldest)
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "failed to flush document store on close");
        }
    }
}

impl StorageBackend for SledStore {
    fn name(&self) -> &str {
        "sled"
    }

    fn migrate(&self, supplied_key: &str) -> Result<MigrationReport> {
        self.services.check_migration_key(supplied_key)?;

        let meta = self.db.open_tree(META)?;
        let mut report = MigrationReport::default();
        for name in COLLECTIONS {
            self.db.open_tree(name)?;
        }
        let step = format!("collections_v{}", SCHEMA_VERSION);
        if meta.contains_key(SCHEMA_KEY)? {
            report.already_applied = 1;
        } else {
            meta.insert(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes()[..])?;
            report.applied.push(step);
        }
        self.db.flush()?;

        info!(
            backend = "sled",
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "schema migration finished"
        );
        Ok(report)
    }

    fn user_create(&self, username: &str, password_hash: &str, phone: &str) -> Result<User> {
        let cols = self.collections()?;
        let id = self.next_id()?;
        let key = id_key(id);

        let now = Utc::now();
        let doc = UserDocument {
            id,
            username: username.to_string(),
            phone: phone.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        let bytes = serde_json::to_vec(&doc)?;

        let created: TransactionResult<(), Error> = (&cols.users, &cols.by_username, &cols.by_phone)
            .transaction(|(users, by_username, by_phone)| {
                if by_username.get(username.as_bytes())?.is_some() {
                    return abort(Error::conflict("username already registered"));
                }
                if by_phone.get(phone.as_bytes())?.is_some() {
                    return abort(Error::conflict("phone already registered"));
                }
                by_username.insert(username.as_bytes(), &key[..])?;
                by_phone.insert(phone.as_bytes(), &key[..])?;
                users.insert(&key[..], bytes.as_slice())?;
                Ok(())
            });
        created.map_err(from_transaction)?;

        debug!(user_id = id, "created user document");
        self.with_user_token(doc.into())
    }

    fn user_by_token(&self, token: &str) -> Result<User> {
        let id = self.services.tokens.resolve(token, EntityKind::User)?;
        let cols = self.collections()?;
        let doc = self
            .load_user(&cols, id)?
            .ok_or_else(|| Error::not_found(format!("user {}", id)))?;
        self.with_user_token(doc.into())
    }

    fn user_by_phone(&self, phone: &str) -> Result<User> {
        let cols = self.collections()?;
        self.user_by_index(&cols.by_phone, &cols, phone, "no user with that phone number")
    }

    fn user_by_username(&self, username: &str) -> Result<User> {
        let cols = self.collections()?;
        self.user_by_index(&cols.by_username, &cols, username, "no user with that username")
    }

    fn user_login(&self, username: &str, plaintext: &str) -> Result<User> {
        let user = self.user_by_username(username)?;
        self.services.hasher.compare(plaintext, &user.password_hash)?;
        Ok(user)
    }

    fn user_save(&self, user: &User) -> Result<()> {
        let cols = self.collections()?;
        let key = id_key(user.id);

        let saved: TransactionResult<(), Error> = (&cols.users, &cols.by_username, &cols.by_phone)
            .transaction(|(users, by_username, by_phone)| {
                let mut doc: UserDocument = match users.get(&key[..])? {
                    Some(bytes) => decode_in_tx(&bytes)?,
                    None => return abort(Error::not_found(format!("user {}", user.id))),
                };

                if user.username != doc.username {
                    if by_username.get(user.username.as_bytes())?.is_some() {
                        return abort(Error::conflict("username already registered"));
                    }
                    by_username.insert(user.username.as_bytes(), &key[..])?;
                    release_entry(by_username, &doc.username, user.id)?;
                }
                if user.phone != doc.phone {
                    if by_phone.get(user.phone.as_bytes())?.is_some() {
                        return abort(Error::conflict("phone already registered"));
                    }
                    by_phone.insert(user.phone.as_bytes(), &key[..])?;
                    release_entry(by_phone, &doc.phone, user.id)?;
                }

                doc.username = user.username.clone();
                doc.phone = user.phone.clone();
                doc.password_hash = user.password_hash.clone();
                doc.updated_at = Utc::now();
                let bytes = serde_json::to_vec(&doc)
                    .map_err(|e| ConflictableTransactionError::Abort(Error::from(e)))?;
                users.insert(&key[..], bytes)?;
                Ok(())
            });
        saved.map_err(from_transaction)
    }

    fn user_delete(&self, user: &User) -> Result<()> {
        let cols = self.collections()?;
        let key = id_key(user.id);

        delete_in_two_phases(
            user.id,
            // One batch, so a failure leaves every note in place
            || {
                let mut batch = Batch::default();
                let mut removed = 0usize;
                for entry in cols.notes.scan_prefix(user.id.to_be_bytes()) {
                    let (entry_key, _) = entry?;
                    batch.remove(entry_key);
                    removed += 1;
                }
                cols.notes.apply_batch(batch)?;
                Ok(removed)
            },
            || {
                let removed: TransactionResult<bool, Error> = (&cols.users, &cols.by_username, &cols.by_phone)
                    .transaction(|(users, by_username, by_phone)| {
                        let doc: UserDocument = match users.remove(&key[..])? {
                            Some(bytes) => decode_in_tx(&bytes)?,
                            None => return Ok(false),
                        };
                        release_entry(by_username, &doc.username, doc.id)?;
                        release_entry(by_phone, &doc.phone, doc.id)?;
                        Ok(true)
                    });
                removed.map_err(from_transaction)
            },
        )
    }

    fn note_create(&self, user: &User, text: &str) -> Result<Note> {
        let cols = self.collections()?;
        let id = self.next_id()?;
        let doc = NoteDocument {
            id,
            user_id: user.id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        cols.notes.insert(note_key(user.id, id), serde_json::to_vec(&doc)?)?;

        let token = self.services.tokens.note_token(id)?;
        Ok(Note::from(doc).with_token(token))
    }

    fn note_list_page(&self, user: &User, page_index: usize, page_size: usize) -> Result<NotePage> {
        let offset = page_offset(page_index, page_size)?;
        let cols = self.collections()?;
        let notes = self
            .scan_notes(&cols, user.id)
            .rev()
            .skip(offset)
            .take(page_size + 1)
            .collect::<Result<Vec<_>>>()?;
        Ok(NotePage::from_overfetch(notes, page_size))
    }

    fn note_latest(&self, user: &User) -> Result<Option<Note>> {
        self.oldest_note(user, |_| true)
    }

    fn note_latest_within(&self, user: &User, window: Duration) -> Result<Option<Note>> {
        let cutoff = Utc::now() - window_to_chrono(window)?;
        self.oldest_note(user, |note| note.created_at >= cutoff)
    }

    fn user_all_notes(&self, user: &User) -> Result<Vec<Note>> {
        let cols = self.collections()?;
        self.scan_notes(&cols, user.id)
            .map(|note| {
                let note = note?;
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

    fn store() -> SledStore {
        let services = BackendServices::new(
            TokenService::new("secret"),
            CredentialHasher::new(Argon2Params::minimal()),
            "mkey",
        );
        SledStore::temporary(services).unwrap()
    }

    #[test]
    fn test_note_keys_sort_by_owner_then_id() {
        assert!(note_key(1, 999) < note_key(2, 1));
        assert!(note_key(2, 1) < note_key(2, 2));
        assert!(note_key(2, 255) < note_key(2, 256));
    }

    #[test]
    fn test_wrong_key_does_not_provision() {
        let store = store();
        let err = store.migrate("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!store.is_provisioned().unwrap());
        assert!(store.user_create("alice", "hash", "1555").is_err());
    }

    #[test]
    fn test_rename_releases_old_index_entry() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("alice", "hash", "1555").unwrap();

        let mut renamed = user.clone();
        renamed.username = "alicia".into();
        store.user_save(&renamed).unwrap();

        assert_eq!(store.user_by_username("alicia").unwrap().id, user.id);
        assert_eq!(store.user_by_username("alice").unwrap_err().kind(), ErrorKind::NotFound);
        // The freed name can be registered again
        store.user_create("alice", "hash", "1666").unwrap();
    }

    #[test]
    fn test_failed_phone_claim_rolls_back_username() {
        let store = store();
        store.migrate("mkey").unwrap();
        store.user_create("alice", "hash", "1555").unwrap();

        let err = store.user_create("bob", "hash", "1555").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        store.user_create("bob", "hash", "1777").unwrap();
    }

    #[test]
    fn test_notes_of_other_users_are_not_scanned() {
        let store = store();
        store.migrate("mkey").unwrap();
        let alice = store.user_create("alice", "hash", "1555").unwrap();
        let bob = store.user_create("bob", "hash", "1666").unwrap();
        store.note_create(&alice, "a1").unwrap();
        store.note_create(&bob, "b1").unwrap();

        let notes = store.user_all_notes(&alice).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "a1");
    }

    fn corrupt_user_document(store: &SledStore, id: u64) {
        store.db.open_tree(USERS).unwrap().insert(id_key(id), &b"not json"[..]).unwrap();
    }

    #[test]
    fn test_failed_save_reserves_nothing() {
        let store = store();
        store.migrate("mkey").unwrap();
        let alice = store.user_create("alice", "hash", "1555").unwrap();
        store.user_create("bob", "hash", "1666").unwrap();

        // New username is free, new phone is taken: neither change may stick
        let mut changed = alice.clone();
        changed.username = "alicia".into();
        changed.phone = "1666".into();
        assert_eq!(store.user_save(&changed).unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(store.user_by_username("alicia").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.user_by_username("alice").unwrap().phone, "1555");

        // Unreadable stored document: the write aborts before any index changes
        corrupt_user_document(&store, alice.id);
        let mut renamed = alice.clone();
        renamed.username = "alicia".into();
        assert_eq!(store.user_save(&renamed).unwrap_err().kind(), ErrorKind::Internal);
        store.user_create("alicia", "hash", "1777").unwrap();
    }

    #[test]
    fn test_user_create_writes_document_and_indexes_together() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("alice", "hash", "1555").unwrap();

        let cols = store.collections().unwrap();
        assert!(cols.users.contains_key(id_key(user.id)).unwrap());
        assert_eq!(cols.by_username.get("alice").unwrap().unwrap().as_ref(), &id_key(user.id)[..]);
        assert_eq!(cols.by_phone.get("1555").unwrap().unwrap().as_ref(), &id_key(user.id)[..]);
        assert_eq!(cols.users.len(), 1);
    }

    #[test]
    fn test_failed_user_phase_reports_partial_deletion() {
        let store = store();
        store.migrate("mkey").unwrap();
        let user = store.user_create("dave", "hash", "1888").unwrap();
        store.note_create(&user, "one").unwrap();
        store.note_create(&user, "two").unwrap();
        corrupt_user_document(&store, user.id);

        let err = store.user_delete(&user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(store.user_all_notes(&user).unwrap().is_empty());

        // The transaction rolled back, so the record and its index entries remain
        let cols = store.collections().unwrap();
        assert!(cols.users.contains_key(id_key(user.id)).unwrap());
        assert!(cols.by_username.contains_key("dave").unwrap());
    }
}
