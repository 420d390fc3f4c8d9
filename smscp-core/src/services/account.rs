//! Account service - the operations callers perform with a capability token
//!
//! Every operation that acts on an existing account starts by resolving the
//! presented user token against storage, so a token for a deleted user stops
//! working immediately. Errors from storage and primitives are passed through
//! unchanged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, DEFAULT_LATEST_WINDOW_SECS, DEFAULT_PAGE_SIZE, DEFAULT_RESET_URL_BASE};
use crate::domain::result::{Error, Result};
use crate::domain::{Note, NotePage, User, UserUpdate};
use crate::ports::{ExportDocument, ExportFormatter, MigrationReport, NotificationSender, StorageBackend};
use crate::services::{CredentialHasher, TokenService};

/// Tunables the account service needs from configuration
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub page_size: usize,
    pub latest_window: Duration,
    pub reset_url_base: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            latest_window: Duration::from_secs(DEFAULT_LATEST_WINDOW_SECS),
            reset_url_base: DEFAULT_RESET_URL_BASE.to_string(),
        }
    }
}

impl From<&Config> for AccountSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            latest_window: config.latest_window(),
            reset_url_base: config.reset_url_base.clone(),
        }
    }
}

/// Landing view for a signed-in user
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub page: NotePage,
    /// Note from the recent window, if any (see `StorageBackend::note_latest_within`)
    pub latest: Option<Note>,
}

/// Account and note operations on top of a storage backend
pub struct AccountService {
    storage: Arc<dyn StorageBackend>,
    hasher: CredentialHasher,
    tokens: TokenService,
    notifier: Arc<dyn NotificationSender>,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        hasher: CredentialHasher,
        tokens: TokenService,
        notifier: Arc<dyn NotificationSender>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            storage,
            hasher,
            tokens,
            notifier,
            settings,
        }
    }

    /// Provision storage, gated by the migration key
    pub fn migrate(&self, migration_key: &str) -> Result<MigrationReport> {
        self.storage.migrate(migration_key)
    }

    /// Register a new account
    ///
    /// Passwords are checked before hashing; duplicate username or phone is a
    /// `Conflict` from storage.
    pub fn create_user(&self, username: &str, password: &str, verify: &str, phone: &str) -> Result<User> {
        let username = required("username", username)?;
        let phone = required("phone", phone)?;
        check_new_password(password, verify)?;

        let digest = self.hasher.hash(password)?;
        let user = self.storage.user_create(username, &digest, phone)?;
        info!(user_id = user.id, "registered user");
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<User> {
        self.storage.user_login(username.trim(), password)
    }

    pub fn current_user(&self, token: &str) -> Result<User> {
        self.storage.user_by_token(token)
    }

    /// Change username, phone and/or password
    ///
    /// Blank username or phone is left unchanged. The password is taken
    /// verbatim: it must equal `verify`, and only an empty one means "keep".
    /// Returns the user with a fresh token.
    pub fn update_user(&self, token: &str, update: UserUpdate) -> Result<User> {
        let password = update.password.as_deref().unwrap_or("");
        if password != update.verify.as_deref().unwrap_or("") {
            return Err(Error::invalid_input("passwords do not match"));
        }

        let mut user = self.storage.user_by_token(token)?;
        if update.is_empty() {
            return Ok(user);
        }

        if let Some(username) = non_blank(update.username.as_deref()) {
            user.username = username.to_string();
        }
        if let Some(phone) = non_blank(update.phone.as_deref()) {
            user.phone = phone.to_string();
        }
        if !password.is_empty() {
            user.password_hash = self.hasher.hash(password)?;
        }

        self.storage.user_save(&user)?;
        let token = self.tokens.user_token(user.id)?;
        debug!(user_id = user.id, "updated user");
        Ok(user.with_token(token))
    }

    /// Store a note and echo it to the owner's phone
    ///
    /// The note is kept even when the echo fails; the send error is returned.
    pub fn post_note(&self, token: &str, text: &str) -> Result<Note> {
        let text = required("note text", text)?;
        let user = self.storage.user_by_token(token)?;
        let note = self.storage.note_create(&user, text)?;
        self.notifier.send(&user.phone, &note.text)?;
        Ok(note)
    }

    /// Inbound SMS: file the text under the account owning `origin`
    pub fn receive_inbound(&self, origin: &str, text: &str) -> Result<Note> {
        let text = required("message body", text)?;
        let user = self.storage.user_by_phone(origin.trim())?;
        let note = self.storage.note_create(&user, text)?;
        debug!(user_id = user.id, note_id = note.id, "filed inbound message");
        Ok(note)
    }

    /// One page of notes, newest first, using the configured page size
    pub fn list_notes(&self, token: &str, page_index: usize) -> Result<NotePage> {
        let user = self.storage.user_by_token(token)?;
        self.storage.note_list_page(&user, page_index, self.settings.page_size)
    }

    pub fn dashboard(&self, token: &str) -> Result<Dashboard> {
        let user = self.storage.user_by_token(token)?;
        let page = self.storage.note_list_page(&user, 0, self.settings.page_size)?;
        let latest = self.storage.note_latest_within(&user, self.settings.latest_window)?;
        Ok(Dashboard { user, page, latest })
    }

    pub fn note_latest(&self, token: &str) -> Result<Option<Note>> {
        let user = self.storage.user_by_token(token)?;
        self.storage.note_latest(&user)
    }

    /// Everything stored about the account, in the formatter's document format
    pub fn export_all(&self, token: &str, formatter: &dyn ExportFormatter) -> Result<ExportDocument> {
        let user = self.storage.user_by_token(token)?;
        let notes = self.storage.user_all_notes(&user)?;
        formatter.format(&user, &notes)
    }

    /// Remove the account and all of its notes
    pub fn delete_all(&self, token: &str) -> Result<()> {
        let user = self.storage.user_by_token(token)?;
        self.storage.user_delete(&user)
    }

    /// Send a password reset link to the account's phone
    pub fn forgot_password(&self, username: &str) -> Result<()> {
        let user = self.storage.user_by_username(username.trim())?;
        let token = self.tokens.password_reset_token(user.id, Utc::now())?;
        let link = self.reset_link(&token)?;
        self.notifier
            .send(&user.phone, &format!("Reset your smscp password: {}", link))?;
        info!(user_id = user.id, "sent password reset link");
        Ok(())
    }

    /// Redeem a reset token and set a new password
    pub fn reset_password(&self, reset_token: &str, password: &str, verify: &str) -> Result<User> {
        check_new_password(password, verify)?;
        let (user_id, _issued_at) = self.tokens.resolve_password_reset(reset_token)?;

        let mut user = self.storage.user_by_token(&self.tokens.user_token(user_id)?)?;
        user.password_hash = self.hasher.hash(password)?;
        self.storage.user_save(&user)?;

        info!(user_id, "password reset");
        let token = self.tokens.user_token(user.id)?;
        Ok(user.with_token(token))
    }

    /// `reset_url_base` with the token appended as the last path segment
    pub fn reset_link(&self, reset_token: &str) -> Result<String> {
        let mut url = Url::parse(&self.settings.reset_url_base)?;
        url.path_segments_mut()
            .map_err(|_| Error::config("reset URL base cannot take a path"))?
            .pop_if_empty()
            .push(reset_token);
        Ok(url.into())
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

/// Usernames and phone numbers are stored and looked up trimmed
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn check_new_password(password: &str, verify: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::invalid_input("password must not be empty"));
    }
    if password != verify {
        return Err(Error::invalid_input("passwords do not match"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbStore;
    use crate::adapters::notifier::RecordingSender;
    use crate::adapters::BackendServices;
    use crate::domain::result::ErrorKind;
    use crate::domain::Argon2Params;

    struct Fixture {
        service: AccountService,
        outbox: Arc<RecordingSender>,
    }

    fn fixture() -> Fixture {
        let tokens = TokenService::new("account-test-secret");
        let hasher = CredentialHasher::new(Argon2Params::minimal());
        let store = DuckDbStore::open_in_memory(BackendServices::new(tokens.clone(), hasher.clone(), "mkey")).unwrap();
        let outbox = Arc::new(RecordingSender::new());
        let settings = AccountSettings {
            page_size: 3,
            reset_url_base: "https://smscp.test/reset".into(),
            ..AccountSettings::default()
        };
        let service = AccountService::new(Arc::new(store), hasher, tokens, outbox.clone(), settings);
        service.migrate("mkey").unwrap();
        Fixture { service, outbox }
    }

    fn alice(service: &AccountService) -> User {
        service
            .create_user("alice", "pw123", "pw123", "+15551234567")
            .unwrap()
    }

    #[test]
    fn test_create_user_validates_passwords_first() {
        let f = fixture();
        let err = f.service.create_user("alice", "pw", "other", "+1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = f.service.create_user("alice", "", "", "+1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = f.service.create_user(" ", "pw", "pw", "+1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // Nothing was stored by the failed attempts
        alice(&f.service);
    }

    #[test]
    fn test_post_note_echoes_to_owner() {
        let f = fixture();
        let user = alice(&f.service);
        let note = f.service.post_note(user.token().unwrap(), "buy milk").unwrap();

        assert_eq!(note.user_id, user.id);
        assert_eq!(
            f.outbox.sent(),
            vec![("+15551234567".to_string(), "buy milk".to_string())]
        );
    }

    #[test]
    fn test_inbound_message_is_not_echoed() {
        let f = fixture();
        let user = alice(&f.service);
        let note = f.service.receive_inbound("+15551234567", "from my phone").unwrap();

        assert_eq!(note.user_id, user.id);
        assert!(f.outbox.sent().is_empty());

        let err = f.service.receive_inbound("+19999999999", "stranger").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_update_user_changes_only_given_fields() {
        let f = fixture();
        let user = alice(&f.service);
        let token = user.token().unwrap().to_string();

        let updated = f
            .service
            .update_user(
                &token,
                UserUpdate {
                    username: Some("alicia".into()),
                    phone: Some("  ".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.phone, "+15551234567");
        assert!(updated.token().is_some());

        // Password unchanged
        f.service.login("alicia", "pw123").unwrap();

        let err = f
            .service
            .update_user(
                &token,
                UserUpdate {
                    password: Some("new".into()),
                    verify: Some("typo".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_update_to_taken_username_conflicts() {
        let f = fixture();
        let user = alice(&f.service);
        f.service.create_user("bob", "pw", "pw", "+1666").unwrap();

        let err = f
            .service
            .update_user(
                user.token().unwrap(),
                UserUpdate {
                    username: Some("bob".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_password_reset_flow() {
        let f = fixture();
        let user = alice(&f.service);
        f.service.forgot_password("alice").unwrap();

        let sent = f.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, user.phone);
        let link = sent[0].1.rsplit(' ').next().unwrap();
        assert!(link.starts_with("https://smscp.test/reset/"));
        let reset_token = link.rsplit('/').next().unwrap();

        let err = f.service.reset_password(reset_token, "new", "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let reset = f.service.reset_password(reset_token, "newpw", "newpw").unwrap();
        assert_eq!(reset.id, user.id);
        assert_eq!(
            f.service.login("alice", "pw123").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        f.service.login("alice", "newpw").unwrap();

        // A user token is not a reset token
        let err = f
            .service
            .reset_password(user.token().unwrap(), "x", "x")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidToken);
    }

    #[test]
    fn test_forgot_password_unknown_user() {
        let f = fixture();
        let err = f.service.forgot_password("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.outbox.sent().is_empty());
    }

    #[test]
    fn test_dashboard_uses_configured_page_size() {
        let f = fixture();
        let user = alice(&f.service);
        let token = user.token().unwrap();
        for i in 0..4 {
            f.service.post_note(token, &format!("note {}", i)).unwrap();
        }

        let dashboard = f.service.dashboard(token).unwrap();
        assert_eq!(dashboard.page.notes.len(), 3);
        assert!(dashboard.page.has_more);
        assert_eq!(dashboard.page.notes[0].text, "note 3");
        assert_eq!(dashboard.latest.unwrap().text, "note 0");

        let second = f.service.list_notes(token, 1).unwrap();
        assert_eq!(second.notes.len(), 1);
        assert!(!second.has_more);
    }

    #[test]
    fn test_delete_all_revokes_token() {
        let f = fixture();
        let user = alice(&f.service);
        let token = user.token().unwrap();
        f.service.post_note(token, "bye").unwrap();

        f.service.delete_all(token).unwrap();
        assert_eq!(f.service.current_user(token).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(f.service.delete_all(token).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reset_link_keeps_base_path() {
        let f = fixture();
        assert_eq!(
            f.service.reset_link("abc.def.ghi").unwrap(),
            "https://smscp.test/reset/abc.def.ghi"
        );
    }

    #[test]
    fn test_update_keeps_password_padding() {
        let f = fixture();
        let user = f
            .service
            .create_user("alice", " pw ", " pw ", "+15551234567")
            .unwrap();

        f.service
            .update_user(
                user.token().unwrap(),
                UserUpdate {
                    password: Some(" new ".into()),
                    verify: Some(" new ".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap();

        f.service.login("alice", " new ").unwrap();
        assert_eq!(
            f.service.login("alice", "new").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn test_update_password_must_match_verify_even_when_empty() {
        let f = fixture();
        let user = alice(&f.service);
        let token = user.token().unwrap();

        for (password, verify) in [("", "x"), ("   ", ""), ("a", "a ")] {
            let err = f
                .service
                .update_user(
                    token,
                    UserUpdate {
                        password: Some(password.into()),
                        verify: Some(verify.into()),
                        ..UserUpdate::default()
                    },
                )
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{:?} / {:?}", password, verify);
        }

        // Whitespace is a real password, not "unchanged"
        f.service
            .update_user(
                token,
                UserUpdate {
                    password: Some("   ".into()),
                    verify: Some("   ".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap();
        f.service.login("alice", "   ").unwrap();
    }

    #[test]
    fn test_usernames_and_phones_are_trimmed_on_every_path() {
        let f = fixture();
        f.service
            .create_user(" alice ", "pw123", "pw123", " +15551234567 ")
            .unwrap();

        let user = f.service.login(" alice", "pw123").unwrap();
        assert_eq!(user.username, "alice");
        f.service.receive_inbound("+15551234567 ", "hi").unwrap();
        f.service.forgot_password("alice ").unwrap();
        assert_eq!(f.outbox.sent().len(), 1);
    }
}
