//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "backend": "relational",
//!   "tokenSecret": "...",
//!   "migrationKey": "...",
//!   "resetUrlBase": "https://smscp.example/reset/",
//!   "twilio": { "accountSid": "AC...", "authToken": "...", "from": "+1555..." },
//!   "pageSize": 20,
//!   "latestWindowSecs": 300
//! }
//! ```
//!
//! Environment variables override the file. This module is the only place the
//! environment is read; everything else receives a [`Config`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::Argon2Params;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_LATEST_WINDOW_SECS: u64 = 300;
pub const DEFAULT_RESET_URL_BASE: &str = "http://localhost:8080/reset/";

/// Which storage backend to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Relational,
    Document,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relational" | "duckdb" => Ok(Self::Relational),
            "document" | "sled" => Ok(Self::Document),
            other => Err(Error::config(format!(
                "unknown backend '{}' (expected 'relational' or 'document')",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Twilio account used for outbound SMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    backend: Option<Backend>,
    #[serde(default)]
    token_secret: Option<String>,
    #[serde(default)]
    migration_key: Option<String>,
    #[serde(default)]
    reset_url_base: Option<String>,
    #[serde(default)]
    twilio: Option<TwilioSettings>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    latest_window_secs: Option<u64>,
    #[serde(default)]
    argon2: Option<Argon2Params>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// smscp configuration
#[derive(Clone)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub token_secret: String,
    pub migration_key: String,
    pub reset_url_base: String,
    pub twilio: Option<TwilioSettings>,
    pub page_size: usize,
    pub latest_window_secs: u64,
    pub argon2: Argon2Params,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("data_dir", &self.data_dir)
            .field("reset_url_base", &self.reset_url_base)
            .field("twilio", &self.twilio.as_ref().map(|t| &t.account_sid))
            .field("page_size", &self.page_size)
            .field("latest_window_secs", &self.latest_window_secs)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Defaults for a data directory, before settings and environment apply
    pub fn new(data_dir: &Path) -> Self {
        Self {
            backend: Backend::default(),
            data_dir: data_dir.to_path_buf(),
            token_secret: String::new(),
            migration_key: String::new(),
            reset_url_base: DEFAULT_RESET_URL_BASE.to_string(),
            twilio: None,
            page_size: DEFAULT_PAGE_SIZE,
            latest_window_secs: DEFAULT_LATEST_WINDOW_SECS,
            argon2: Argon2Params::default(),
        }
    }

    /// Load config from the data directory and the process environment
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// Load config with an explicit environment lookup
    ///
    /// Overrides: SMSCP_BACKEND, SMSCP_TOKEN_SECRET, SMSCP_MIGRATION_KEY,
    /// SMSCP_RESET_URL, and TWILIO_ID / TWILIO_SECRET / TWILIO_FROM (all three
    /// are needed to enable Twilio).
    pub fn load_with_env<F>(data_dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = read_settings(data_dir)?;
        let mut config = Self::new(data_dir);

        if let Some(backend) = raw.backend {
            config.backend = backend;
        }
        if let Some(secret) = raw.token_secret {
            config.token_secret = secret;
        }
        if let Some(key) = raw.migration_key {
            config.migration_key = key;
        }
        if let Some(url) = raw.reset_url_base {
            config.reset_url_base = url;
        }
        if let Some(size) = raw.page_size {
            config.page_size = size;
        }
        if let Some(secs) = raw.latest_window_secs {
            config.latest_window_secs = secs;
        }
        if let Some(params) = raw.argon2 {
            config.argon2 = params;
        }
        config.twilio = raw.twilio;

        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        if let Some(backend) = env("SMSCP_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(secret) = env("SMSCP_TOKEN_SECRET") {
            config.token_secret = secret;
        }
        if let Some(key) = env("SMSCP_MIGRATION_KEY") {
            config.migration_key = key;
        }
        if let Some(url) = env("SMSCP_RESET_URL") {
            config.reset_url_base = url;
        }
        if let (Some(account_sid), Some(auth_token), Some(from)) =
            (env("TWILIO_ID"), env("TWILIO_SECRET"), env("TWILIO_FROM"))
        {
            config.twilio = Some(TwilioSettings {
                account_sid,
                auth_token,
                from,
            });
        }

        Ok(config)
    }

    /// Save config to the data directory
    /// Preserves settings this crate doesn't manage
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let mut settings = read_settings(&self.data_dir)?;

        settings.backend = Some(self.backend);
        settings.token_secret = Some(self.token_secret.clone());
        settings.migration_key = Some(self.migration_key.clone());
        settings.reset_url_base = Some(self.reset_url_base.clone());
        settings.twilio = self.twilio.clone();
        settings.page_size = Some(self.page_size);
        settings.latest_window_secs = Some(self.latest_window_secs);
        settings.argon2 = Some(self.argon2);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(self.data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.token_secret.is_empty() {
            return Err(Error::config(
                "token secret is not set (settings.json tokenSecret or SMSCP_TOKEN_SECRET)",
            ));
        }
        if self.migration_key.is_empty() {
            return Err(Error::config(
                "migration key is not set (settings.json migrationKey or SMSCP_MIGRATION_KEY)",
            ));
        }
        if self.page_size == 0 {
            return Err(Error::config("page size must be at least 1"));
        }
        url::Url::parse(&self.reset_url_base)?;
        Ok(())
    }

    pub fn latest_window(&self) -> Duration {
        Duration::from_secs(self.latest_window_secs)
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            warn!(path = %settings_path.display(), error = %e, "ignoring unreadable settings file");
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.backend, Backend::Relational);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.latest_window(), Duration::from_secs(300));
        assert!(config.twilio.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"backend":"relational","tokenSecret":"file-secret","migrationKey":"file-key"}"#,
        )
        .unwrap();

        let config = Config::load_with_env(dir.path(), |key| match key {
            "SMSCP_BACKEND" => Some("document".into()),
            "SMSCP_TOKEN_SECRET" => Some("env-secret".into()),
            "SMSCP_MIGRATION_KEY" => Some(String::new()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.backend, Backend::Document);
        assert_eq!(config.token_secret, "env-secret");
        // Empty variables do not override
        assert_eq!(config.migration_key, "file-key");
        config.validate().unwrap();
    }

    #[test]
    fn test_twilio_needs_all_three_variables() {
        let dir = TempDir::new().unwrap();
        let partial = Config::load_with_env(dir.path(), |key| match key {
            "TWILIO_ID" => Some("AC1".into()),
            "TWILIO_SECRET" => Some("s".into()),
            _ => None,
        })
        .unwrap();
        assert!(partial.twilio.is_none());

        let full = Config::load_with_env(dir.path(), |key| match key {
            "TWILIO_ID" => Some("AC1".into()),
            "TWILIO_SECRET" => Some("s".into()),
            "TWILIO_FROM" => Some("+1555".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(full.twilio.unwrap().account_sid, "AC1");
    }

    #[test]
    fn test_save_preserves_unknown_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"theme":"dark","pageSize":5}"#,
        )
        .unwrap();

        let mut config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.page_size, 5);
        config.token_secret = "s".into();
        config.migration_key = "k".into();
        config.save().unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["tokenSecret"], "s");

        let reloaded = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(reloaded.migration_key, "k");
        reloaded.validate().unwrap();
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        assert!("mongo".parse::<Backend>().is_err());
        assert_eq!("SLED".parse::<Backend>().unwrap(), Backend::Document);
    }
}
