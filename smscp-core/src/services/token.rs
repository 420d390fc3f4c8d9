//! Claim token service - HMAC-SHA256 signed capability tokens
//!
//! Tokens use the compact JWT layout (`header.payload.signature`, base64url
//! without padding) with a fixed HS256 header. The signature covers the exact
//! encoded `header.payload` text, so any edit to the string invalidates it.
//!
//! Verification checks structure and signature only. Which claims must be
//! present is decided by the caller (see [`Claims::from_claim_set`]).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::domain::result::{Error, Result};
use crate::domain::{ClaimSet, Claims, EntityKind};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Issues and verifies signed claim tokens
///
/// Stateless and cheap to clone; the secret is shared.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<Vec<u8>>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::new(secret.as_ref().to_vec()),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::upstream(format!("failed to initialise token signer: {}", e)))
    }

    /// Sign an arbitrary claim map
    pub fn issue(&self, claims: &ClaimSet) -> Result<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| Error::upstream(format!("failed to encode claims: {}", e)))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Check structure and signature, returning the signed claim map
    pub fn verify(&self, token: &str) -> Result<ClaimSet> {
        let mut parts = token.split('.');
        let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(Error::unauthorized("malformed token")),
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::unauthorized("malformed token signature"))?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::unauthorized("token signature mismatch"))?;

        // Signed by us, so a bad header or payload is a bug or a key reuse
        let header: Value = decode_json(header)?;
        if header.get("alg").and_then(Value::as_str) != Some("HS256") {
            return Err(Error::unauthorized("unsupported token algorithm"));
        }
        match decode_json(payload)? {
            Value::Object(claims) => Ok(claims),
            _ => Err(Error::invalid_token("token payload is not a claim map")),
        }
    }

    pub fn issue_claims(&self, claims: &Claims) -> Result<String> {
        self.issue(&claims.to_claim_set())
    }

    pub fn verify_claims(&self, token: &str) -> Result<Claims> {
        Claims::from_claim_set(&self.verify(token)?)
    }

    pub fn user_token(&self, user_id: u64) -> Result<String> {
        self.issue_claims(&Claims::user(user_id))
    }

    pub fn note_token(&self, note_id: u64) -> Result<String> {
        self.issue_claims(&Claims::note(note_id))
    }

    pub fn password_reset_token(&self, user_id: u64, issued_at: DateTime<Utc>) -> Result<String> {
        self.issue_claims(&Claims::password_reset(user_id, issued_at))
    }

    /// Verify an entity token and return the ID it names
    pub fn resolve(&self, token: &str, kind: EntityKind) -> Result<u64> {
        self.verify_claims(token)?.expect_entity(kind)
    }

    /// Verify a password-reset token, returning the user ID and issue time
    pub fn resolve_password_reset(&self, token: &str) -> Result<(u64, DateTime<Utc>)> {
        match self.verify_claims(token)? {
            Claims::PasswordReset { user_id, issued_at } => Ok((user_id, issued_at)),
            Claims::Entity { kind, .. } => Err(Error::invalid_token(format!(
                "expected a password-reset token, got a {} token",
                kind
            ))),
        }
    }
}

fn decode_json(segment: &str) -> Result<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| Error::invalid_token("token segment is not base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::invalid_token("token segment is not JSON"))
}
