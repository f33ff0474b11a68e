use std::path::PathBuf;
use thiserror::Error;

use crate::admin::AdminError;
use crate::db::DatabaseError;
use crate::intake::{FetchError, PipelineError};
use crate::mailbox::MailboxError;
use crate::routing::RoutingError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum MailrouteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' in environment variable {name}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, MailrouteError>;
