//! Gmail REST implementation of [`Mailbox`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use log::debug;
use mail_builder::MessageBuilder;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::admin::looks_like_email;

use super::auth::{sanitize_error_body, TokenProvider};
use super::client::{create_http_client, HttpSettings, Mailbox};
use super::error::{MailboxError, Result};
use super::model::{MessagePage, RawMessage};

/// Default Gmail API root.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Gmail API client acting on the authorized user's own mailbox.
pub struct GmailClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl GmailClient {
    /// Creates a client. The proxy and timeout come from `http`; nothing is
    /// read from process-wide state.
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        http: &HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: create_http_client(http)?,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.base_url, path)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(request.bearer_auth(token.expose_secret()))
    }

    async fn execute(&self, request: RequestBuilder, operation: &'static str) -> Result<Response> {
        let response = self.authorized(request).await?.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(MailboxError::Api {
            operation,
            status,
            body: sanitize_error_body(&body),
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T> {
        self.execute(request, operation)
            .await?
            .json::<T>()
            .await
            .map_err(|e| MailboxError::Decode {
                operation,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_unread(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
            ("includeSpamTrash", "false".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let request = self.client.get(self.url("messages")).query(&params);
        let page: MessagePage = self.execute_json(request, "messages.list").await?;
        debug!("Listed {} messages", page.messages.len());
        Ok(page)
    }

    async fn get_full(&self, id: &str) -> Result<RawMessage> {
        let request = self
            .client
            .get(self.url(&format!("messages/{}", id)))
            .query(&[("format", "full")]);
        self.execute_json(request, "messages.get").await
    }

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let raw = URL_SAFE.encode(build_raw_message(to, subject, html_body)?);
        let request = self
            .client
            .post(self.url("messages/send"))
            .json(&json!({ "raw": raw }));
        self.execute(request, "messages.send").await?;
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("messages/{}/modify", id)))
            .json(&json!({ "removeLabelIds": ["UNREAD"] }));
        self.execute(request, "messages.modify").await?;
        Ok(())
    }
}

/// Builds the RFC 5322 message for `messages/send`. Header encoding and
/// folding are left to `mail-builder`; the recipient must be one bare address.
fn build_raw_message(to: &str, subject: &str, html_body: &str) -> Result<Vec<u8>> {
    if !looks_like_email(to) {
        return Err(MailboxError::InvalidRecipient(to.to_string()));
    }

    MessageBuilder::new()
        .to(to)
        .subject(subject)
        .html_body(html_body)
        .write_to_vec()
        .map_err(|e| MailboxError::Compose(e.to_string()))
}
