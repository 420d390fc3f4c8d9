//! Claim sets carried by capability tokens
//!
//! A token encodes one of three shapes:
//!
//! - `{"EntityKind": "User", "ID": n}`
//! - `{"EntityKind": "Note", "ID": n}`
//! - `{"Purpose": "PasswordReset", "UserID": n, "IssuedAt": unix_seconds}`
//!
//! The token layer only signs and checks maps; interpreting them happens here,
//! and a missing or mistyped key is always an `InvalidToken` error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::result::{Error, Result};

/// Raw claim map as signed into a token
pub type ClaimSet = Map<String, Value>;

pub const KEY_ENTITY_KIND: &str = "EntityKind";
pub const KEY_ID: &str = "ID";
pub const KEY_PURPOSE: &str = "Purpose";
pub const KEY_USER_ID: &str = "UserID";
pub const KEY_ISSUED_AT: &str = "IssuedAt";

const PURPOSE_PASSWORD_RESET: &str = "PasswordReset";

/// Kind of record an entity token names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Note,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Note => "Note",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(EntityKind::User),
            "Note" => Some(EntityKind::Note),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claims {
    Entity { kind: EntityKind, id: u64 },
    PasswordReset { user_id: u64, issued_at: DateTime<Utc> },
}

impl Claims {
    pub fn user(id: u64) -> Self {
        Claims::Entity { kind: EntityKind::User, id }
    }

    pub fn note(id: u64) -> Self {
        Claims::Entity { kind: EntityKind::Note, id }
    }

    pub fn password_reset(user_id: u64, issued_at: DateTime<Utc>) -> Self {
        Claims::PasswordReset { user_id, issued_at }
    }

    pub fn to_claim_set(&self) -> ClaimSet {
        let mut set = ClaimSet::new();
        match self {
            Claims::Entity { kind, id } => {
                set.insert(KEY_ENTITY_KIND.into(), Value::from(kind.as_str()));
                set.insert(KEY_ID.into(), Value::from(*id));
            }
            Claims::PasswordReset { user_id, issued_at } => {
                set.insert(KEY_PURPOSE.into(), Value::from(PURPOSE_PASSWORD_RESET));
                set.insert(KEY_USER_ID.into(), Value::from(*user_id));
                set.insert(KEY_ISSUED_AT.into(), Value::from(issued_at.timestamp()));
            }
        }
        set
    }

    pub fn from_claim_set(set: &ClaimSet) -> Result<Self> {
        if let Some(purpose) = set.get(KEY_PURPOSE) {
            return match purpose.as_str() {
                Some(PURPOSE_PASSWORD_RESET) => {
                    let user_id = id_claim(set, KEY_USER_ID)?;
                    let issued = set
                        .get(KEY_ISSUED_AT)
                        .and_then(Value::as_i64)
                        .ok_or_else(|| Error::invalid_token("missing IssuedAt claim"))?;
                    let issued_at = DateTime::from_timestamp(issued, 0)
                        .ok_or_else(|| Error::invalid_token("IssuedAt out of range"))?;
                    Ok(Claims::PasswordReset { user_id, issued_at })
                }
                _ => Err(Error::invalid_token("unknown token purpose")),
            };
        }

        let kind = set
            .get(KEY_ENTITY_KIND)
            .and_then(Value::as_str)
            .and_then(EntityKind::parse)
            .ok_or_else(|| Error::invalid_token("missing or unknown EntityKind claim"))?;
        let id = id_claim(set, KEY_ID)?;
        Ok(Claims::Entity { kind, id })
    }

    /// ID of an entity token of the expected kind
    pub fn expect_entity(&self, expected: EntityKind) -> Result<u64> {
        match self {
            Claims::Entity { kind, id } if *kind == expected => Ok(*id),
            Claims::Entity { kind, .. } => Err(Error::invalid_token(format!(
                "expected a {} token, got a {} token",
                expected, kind
            ))),
            Claims::PasswordReset { .. } => Err(Error::invalid_token(format!(
                "expected a {} token, got a password-reset token",
                expected
            ))),
        }
    }
}

fn id_claim(set: &ClaimSet, key: &str) -> Result<u64> {
    set.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::invalid_token(format!("missing or non-numeric {} claim", key)))
}
