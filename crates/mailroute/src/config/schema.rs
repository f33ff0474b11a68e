use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;
use crate::intake::fetcher::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_BATCHES};
use crate::intake::ForwardTemplate;
use crate::mailbox::auth::GOOGLE_TOKEN_URL;
use crate::mailbox::gmail::GMAIL_API_BASE;
use crate::mailbox::HttpSettings;
use crate::secrets::{expand_home, SecretSource};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub forwarding: ForwardTemplate,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            gmail: GmailConfig::default(),
            intake: IntakeConfig::default(),
            forwarding: ForwardTemplate::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            seed_defaults: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Mail service account and credentials.
///
/// With `access_token` configured the client uses that token as is;
/// otherwise it exchanges `refresh_token` using the client id and secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// Address of the polled mailbox. Informational; the API acts on the
    /// authorized account.
    pub user_email: String,
    pub api_base_url: String,
    pub token_url: String,
    pub client_id: SecretSource,
    pub client_secret: SecretSource,
    pub refresh_token: SecretSource,
    pub access_token: SecretSource,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            user_email: String::new(),
            api_base_url: GMAIL_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: SecretSource::env("GMAIL_CLIENT_ID"),
            client_secret: SecretSource::env("GMAIL_CLIENT_SECRET"),
            refresh_token: SecretSource::env("GMAIL_REFRESH_TOKEN"),
            access_token: SecretSource::default(),
            timeout_secs: 30,
            proxy: None,
        }
    }
}

impl GmailConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            proxy: self.proxy.clone().filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub check_interval_secs: u64,
    /// Ids per listing page; 0 selects the default.
    pub batch_size: u32,
    /// Listing pages per run; 0 selects the default.
    pub max_batches: u32,
    /// Detail fetches in flight per page.
    pub concurrency: usize,
    pub page_delay_ms: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: DEFAULT_MAX_BATCHES,
            concurrency: DEFAULT_CONCURRENCY,
            page_delay_ms: 50,
        }
    }
}

impl IntakeConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `~` is expanded. Defaults to `~/.mailroute/data/mailroute.db`.
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match self.path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => Some(expand_home(path)),
            None => default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
