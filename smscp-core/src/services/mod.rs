//! Service layer - business logic orchestration
//!
//! The credential hasher and token service are the two primitives every
//! backend shares; the account service coordinates them with storage and the
//! notification sender.

pub mod account;
pub mod migration;
mod password;
mod token;

pub use account::{AccountService, AccountSettings, Dashboard};
pub use migration::MigrationService;
pub use password::CredentialHasher;
pub use token::TokenService;
