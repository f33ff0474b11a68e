//! OAuth2 access tokens for the mail service API.
//!
//! First-time authorization happens out of band; this module only turns a
//! stored refresh token into short-lived access tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::info;
use moka::future::Cache;
use moka::Expiry;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::client::{create_http_client, HttpSettings};
use super::error::{MailboxError, Result};

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Maximum length for sanitized error bodies to prevent log flooding.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Tokens are refreshed this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on how long an access token is cached.
const MAX_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Source of bearer tokens for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString>;
}

/// A fixed access token, for tests and manually managed deployments.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<SecretString> {
        Ok(self.0.clone())
    }
}

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    /// How long the token stays usable, expiry margin already subtracted.
    usable_for: Duration,
}

/// Expires each cached token by its own lifetime, capped at [`MAX_CACHE_TTL`].
struct TokenExpiry;

impl Expiry<(), CachedToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &(),
        value: &CachedToken,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.usable_for.min(MAX_CACHE_TTL))
    }
}

/// Exchanges a refresh token for access tokens and caches them until
/// shortly before they expire.
pub struct RefreshTokenProvider {
    client: Client,
    token_url: String,
    client_id: SecretString,
    client_secret: SecretString,
    refresh_token: SecretString,
    cache: Cache<(), CachedToken>,
}

impl RefreshTokenProvider {
    pub fn new(
        token_url: String,
        client_id: SecretString,
        client_secret: SecretString,
        refresh_token: SecretString,
        http: &HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: create_http_client(http)?,
            token_url,
            client_id,
            client_secret,
            refresh_token,
            cache: Cache::builder()
                .max_capacity(1)
                .expire_after(TokenExpiry)
                .build(),
        })
    }

    async fn refresh(&self) -> Result<TokenResponse> {
        info!("Refreshing access token");

        let params = [
            ("client_id", self.client_id.expose_secret()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", self.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| MailboxError::OAuth2Error(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::OAuth2Error(format!(
                "Token refresh failed ({}): {}",
                status,
                sanitize_error_body(&body)
            )));
        }

        response.json().await.map_err(|e| {
            MailboxError::OAuth2Error(format!("Failed to parse refresh response: {}", e))
        })
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    /// Concurrent callers that miss the cache share a single refresh.
    async fn access_token(&self) -> Result<SecretString> {
        let cached = self
            .cache
            .try_get_with((), async {
                let response = self.refresh().await?;
                let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
                Ok::<_, MailboxError>(CachedToken {
                    token: SecretString::from(response.access_token),
                    usable_for: lifetime.saturating_sub(EXPIRY_MARGIN),
                })
            })
            .await
            .map_err(Arc::unwrap_or_clone)?;
        Ok(cached.token)
    }
}

/// Truncates an OAuth error body so token material never floods the logs.
pub(crate) fn sanitize_error_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}
