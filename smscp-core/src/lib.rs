//! smscp core - accounts and notes behind capability tokens
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: users, notes, claims and the error type
//! - **ports**: traits for storage, outbound notifications and exports
//! - **services**: credential hashing, claim tokens, the account service
//! - **adapters**: DuckDB and sled storage, Twilio and logging senders, CSV export

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use adapters::duckdb::DuckDbStore;
use adapters::notifier::LogSender;
use adapters::sled::SledStore;
use adapters::twilio::TwilioSender;
use adapters::BackendServices;
use config::{Backend, Config};
use ports::{NotificationSender, StorageBackend};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, Result};
pub use domain::{Note, NotePage, User, UserUpdate};

pub const DUCKDB_FILE: &str = "smscp.duckdb";
pub const SLED_DIR: &str = "smscp.sled";

/// Main context for smscp operations
///
/// Holds the configuration, the opened storage backend and the services built
/// on top of it.
pub struct SmscpContext {
    pub config: Config,
    pub storage: Arc<dyn StorageBackend>,
    pub tokens: TokenService,
    pub account_service: AccountService,
}

impl SmscpContext {
    /// Load configuration from `data_dir` (and the environment) and open it
    pub fn new(data_dir: &Path) -> Result<Self> {
        Self::from_config(Config::load(data_dir)?)
    }

    /// Open with the notifier the configuration asks for
    pub fn from_config(config: Config) -> Result<Self> {
        let notifier: Arc<dyn NotificationSender> = match &config.twilio {
            Some(twilio) => Arc::new(TwilioSender::new(twilio)?),
            None => Arc::new(LogSender),
        };
        Self::with_notifier(config, notifier)
    }

    /// Open with an explicit notifier
    pub fn with_notifier(config: Config, notifier: Arc<dyn NotificationSender>) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let tokens = TokenService::new(&config.token_secret);
        let hasher = CredentialHasher::new(config.argon2);
        let backend_services = BackendServices::new(tokens.clone(), hasher.clone(), config.migration_key.clone());

        let storage: Arc<dyn StorageBackend> = match config.backend {
            Backend::Relational => Arc::new(DuckDbStore::open(
                &config.data_dir.join(DUCKDB_FILE),
                backend_services,
            )?),
            Backend::Document => Arc::new(SledStore::open(&config.data_dir.join(SLED_DIR), backend_services)?),
        };
        debug!(backend = storage.name(), dir = %config.data_dir.display(), "opened storage");

        let account_service = AccountService::new(
            Arc::clone(&storage),
            hasher,
            tokens.clone(),
            notifier,
            AccountSettings::from(&config),
        );

        Ok(Self {
            config,
            storage,
            tokens,
            account_service,
        })
    }
}
