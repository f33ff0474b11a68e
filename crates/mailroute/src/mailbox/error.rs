//! Mailbox client error types.

use thiserror::Error;

/// Errors that can occur while talking to the mail service.
#[derive(Error, Debug, Clone)]
pub enum MailboxError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("Mail service request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Mail service returned {status} for {operation}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected model.
    #[error("Failed to decode mail service response for {operation}: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    /// OAuth2 access token could not be obtained.
    #[error("OAuth2 token error: {0}")]
    OAuth2Error(String),

    /// The recipient is not a single bare address.
    #[error("Invalid recipient address '{0}'")]
    InvalidRecipient(String),

    /// The outgoing message could not be serialized.
    #[error("Failed to compose message: {0}")]
    Compose(String),

    /// Invalid client configuration (bad proxy URL, missing credentials).
    #[error("Invalid mailbox configuration: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for MailboxError {
    fn from(err: reqwest::Error) -> Self {
        MailboxError::Transport(err.to_string())
    }
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;
