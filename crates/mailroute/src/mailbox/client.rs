//! Mailbox abstraction the intake pipeline talks to.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::{MailboxError, Result};
use super::model::{MessagePage, RawMessage};

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the intake pipeline needs from a remote mailbox.
///
/// Implementations must be shareable across the concurrent detail fetches
/// of one page, hence `Send + Sync`.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Lists message ids matching `query`, at most `page_size` per page.
    async fn list_unread(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetches a message with headers and full body tree.
    async fn get_full(&self, id: &str) -> Result<RawMessage>;

    /// Sends an HTML message.
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;

    /// Clears the unread flag of a message.
    async fn mark_read(&self, id: &str) -> Result<()>;
}

/// Transport settings shared by every HTTP client the mailbox builds.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Proxy URL applied to all schemes, if any.
    pub proxy: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
        }
    }
}

/// Creates an HTTP client with the configured timeouts and proxy.
pub fn create_http_client(settings: &HttpSettings) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(settings.timeout);

    // Only the configured proxy applies; ambient proxy variables are ignored.
    match settings.proxy.as_deref().filter(|p| !p.is_empty()) {
        Some(proxy_url) => {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                MailboxError::ConfigError(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
            log::info!("Using proxy {}", proxy_url);
        }
        None => builder = builder.no_proxy(),
    }

    builder
        .build()
        .map_err(|e| MailboxError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}
