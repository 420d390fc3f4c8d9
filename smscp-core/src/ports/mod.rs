//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod export;
mod notifier;
pub mod storage;

pub use export::{ExportDocument, ExportFormatter};
pub use notifier::NotificationSender;
pub use storage::{MigrationReport, StorageBackend};
