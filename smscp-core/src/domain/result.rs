//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Backends and primitives return these unchanged; the account service passes
/// them through to the caller, which maps them to whatever its transport needs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Notes were removed but the user row survived. The account is left
    /// without data but still able to log in until deletion is retried.
    #[error("Deleted notes of user {user_id} but failed to delete the user: {source}")]
    PartialDeletion {
        user_id: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used at the boundary (HTTP status, exit code, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    InvalidInput,
    InvalidToken,
    Upstream,
    PartialFailure,
    Config,
    Internal,
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidToken(_) => ErrorKind::InvalidToken,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::PartialDeletion { .. } => ErrorKind::PartialFailure,
            Self::Config(_) => ErrorKind::Config,
            Self::Database(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Upstream(format!("csv: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {}", err))
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::not_found("user").kind(), ErrorKind::NotFound);
        assert_eq!(Error::conflict("phone").kind(), ErrorKind::Conflict);
        assert_eq!(Error::database("boom").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_partial_deletion_is_distinct() {
        let err = Error::PartialDeletion {
            user_id: 7,
            source: Box::new(Error::database("disk full")),
        };
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        let msg = err.to_string();
        assert!(msg.contains("user 7"));
        assert!(msg.contains("disk full"));
    }
}
