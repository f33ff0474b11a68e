//! Credential resolution.
//!
//! Each credential in the config may be given three ways, checked in order:
//!
//! 1. `value`: the secret inline, for local testing
//! 2. `file`: a path whose trimmed contents are the secret (Docker secrets)
//! 3. `env`: the name of an environment variable holding the secret

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Errors from credential resolution.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No source configured for {what} (set one of value, file or env)")]
    NoSource { what: String },

    #[error("Failed to read {what} from '{path}': {source}")]
    FileRead {
        what: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' for {what} is not set")]
    EnvVarNotSet { what: String, name: String },

    #[error("Environment variable '{name}' for {what} is not valid UTF-8")]
    EnvVarNotUnicode { what: String, name: String },

    #[error("{what} resolved to an empty value")]
    Empty { what: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a credential comes from. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl SecretSource {
    /// A source reading the given environment variable.
    pub fn env(name: impl Into<String>) -> Self {
        Self {
            env: Some(name.into()),
            ..Default::default()
        }
    }

    /// True when at least one source is set.
    pub fn is_configured(&self) -> bool {
        [&self.value, &self.file, &self.env]
            .iter()
            .any(|s| s.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Resolves the secret. `what` names the credential in error messages.
    ///
    /// The first configured source wins; a failing source is an error rather
    /// than a reason to try the next one.
    pub fn resolve(&self, what: &str) -> Result<SecretString> {
        let resolved = if let Some(value) = non_empty(&self.value) {
            value.to_string()
        } else if let Some(path) = non_empty(&self.file) {
            let path = expand_home(path);
            std::fs::read_to_string(&path)
                .map_err(|e| SecretError::FileRead {
                    what: what.to_string(),
                    path,
                    source: e,
                })?
                .trim()
                .to_string()
        } else if let Some(name) = non_empty(&self.env) {
            match std::env::var(name) {
                // Env values may carry a trailing newline.
                Ok(value) => value.trim().to_string(),
                Err(std::env::VarError::NotPresent) => {
                    return Err(SecretError::EnvVarNotSet {
                        what: what.to_string(),
                        name: name.to_string(),
                    })
                }
                Err(std::env::VarError::NotUnicode(_)) => {
                    return Err(SecretError::EnvVarNotUnicode {
                        what: what.to_string(),
                        name: name.to_string(),
                    })
                }
            }
        } else {
            return Err(SecretError::NoSource {
                what: what.to_string(),
            });
        };

        if resolved.is_empty() {
            return Err(SecretError::Empty {
                what: what.to_string(),
            });
        }
        Ok(SecretString::from(resolved))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Expands a leading `~` or `~/` to the home directory. `~user` is not supported.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            };
        }
    }
    PathBuf::from(path)
}
