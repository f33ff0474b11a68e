//! Builders for provider messages and test fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use mailroute::admin::NewDestination;
use mailroute::db::destination_repo::Destination;
use mailroute::mailbox::{Header, MessagePart, PartBody, RawMessage};
use mailroute::{AdminService, BatchFetcher, Database, IntakePipeline};

use super::fake_mailbox::FakeMailbox;

/// Builder for `RawMessage` instances as the provider would return them.
pub struct MessageBuilder {
    id: String,
    headers: Vec<Header>,
    payload_mime: String,
    body: Option<String>,
    parts: Vec<MessagePart>,
}

impl MessageBuilder {
    /// A message with the given provider id and a plain-text body.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            headers: vec![
                header("From", "Alice <alice@example.com>"),
                header("To", "inbox@company.com"),
                header("Date", "Mon, 1 Jan 2024 09:00:00 +0000"),
            ],
            payload_mime: "text/plain".to_string(),
            body: Some("hello".to_string()),
            parts: Vec::new(),
        }
    }

    pub fn subject(self, subject: &str) -> Self {
        self.header("Subject", subject)
    }

    pub fn sender(self, from: &str) -> Self {
        self.header("From", from)
    }

    pub fn date(self, date: &str) -> Self {
        self.header("Date", date)
    }

    /// Sets or replaces a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|h| h.name != name);
        self.headers.push(header(name, value));
        self
    }

    /// Single-part body, base64url encoded.
    pub fn text_body(mut self, body: &str) -> Self {
        self.payload_mime = "text/plain".to_string();
        self.body = Some(body.to_string());
        self.parts.clear();
        self
    }

    /// Multipart body from `(mime type, content)` pairs.
    pub fn multipart(mut self, parts: &[(&str, &str)]) -> Self {
        self.payload_mime = "multipart/alternative".to_string();
        self.body = None;
        self.parts = parts.iter().map(|(mime, text)| text_part(mime, text)).collect();
        self
    }

    pub fn build(self) -> RawMessage {
        RawMessage {
            id: self.id.clone(),
            thread_id: format!("thread-{}", self.id),
            label_ids: vec!["UNREAD".to_string(), "INBOX".to_string()],
            snippet: String::new(),
            payload: MessagePart {
                mime_type: self.payload_mime,
                filename: String::new(),
                headers: self.headers,
                body: Some(PartBody {
                    data: self.body.as_deref().map(encode),
                    size: self.body.as_ref().map_or(0, |b| b.len() as u64),
                    attachment_id: None,
                }),
                parts: self.parts,
            },
        }
    }
}

pub fn header(name: &str, value: &str) -> Header {
    Header {
        name: name.to_string(),
        value: value.to_string(),
    }
}

pub fn text_part(mime: &str, text: &str) -> MessagePart {
    MessagePart {
        mime_type: mime.to_string(),
        body: Some(PartBody {
            data: Some(encode(text)),
            size: text.len() as u64,
            attachment_id: None,
        }),
        ..Default::default()
    }
}

/// Base64url with padding, the way the provider encodes bodies.
pub fn encode(text: &str) -> String {
    URL_SAFE.encode(text.as_bytes())
}

/// A message routed to `target` with `keyword`.
pub fn routed_message(id: &str, keyword: &str, target: &str) -> RawMessage {
    MessageBuilder::new(id)
        .subject(&format!("{} - {}", keyword, target))
        .build()
}

pub fn test_db() -> Database {
    Database::open_in_memory().expect("Failed to create test database")
}

pub fn add_destination(db: &Database, name: &str, email: &str, keywords: &str) -> Destination {
    AdminService::new(db.clone())
        .create_destination(NewDestination {
            name: name.to_string(),
            email: email.to_string(),
            keywords: keywords.to_string(),
            is_active: None,
        })
        .expect("Failed to create destination")
}

/// A pipeline over `mailbox` with no delay between listing pages.
pub fn pipeline(db: &Database, mailbox: &Arc<FakeMailbox>) -> IntakePipeline {
    IntakePipeline::new(db.clone(), mailbox.clone())
        .with_fetcher(fetcher(mailbox))
        .with_batch_limits(10, 5)
}

pub fn fetcher(mailbox: &Arc<FakeMailbox>) -> BatchFetcher {
    BatchFetcher::new(mailbox.clone()).with_page_delay(Duration::ZERO)
}
