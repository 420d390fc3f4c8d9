//! User domain model

use serde::Serialize;

/// An account holder
///
/// Values handed out by a storage backend are copies: mutating one does not
/// touch storage until it is passed back through `StorageBackend::user_save`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub phone: String,
    /// PHC-format Argon2id digest, never plaintext
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Capability token naming this user, minted when the value was loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl User {
    pub fn new(
        id: u64,
        username: impl Into<String>,
        phone: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            phone: phone.into(),
            password_hash: password_hash.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Requested changes to a user; empty fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub verify: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map_or(true, str::is_empty)
        }
        blank(&self.username) && blank(&self.phone) && blank(&self.password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new(1, "alice", "15551234567", "$argon2id$secret").with_token("tok".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"token\":\"tok\""));
    }

    #[test]
    fn test_update_is_empty() {
        assert!(UserUpdate::default().is_empty());
        let update = UserUpdate {
            username: Some(String::new()),
            ..Default::default()
        };
        assert!(update.is_empty());
        let update = UserUpdate {
            phone: Some("15550000000".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
