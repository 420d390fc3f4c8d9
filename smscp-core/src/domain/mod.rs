//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O or external dependencies.

pub mod claims;
mod credentials;
mod note;
pub mod result;
mod user;

pub use claims::{ClaimSet, Claims, EntityKind};
pub use credentials::Argon2Params;
pub use note::{Note, NotePage, PREVIEW_LEN};
pub use user::{User, UserUpdate};
