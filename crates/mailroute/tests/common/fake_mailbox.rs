//! In-memory `Mailbox` for driving the fetcher and pipeline.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use mailroute::mailbox::{MessagePage, MessageRef, RawMessage};
use mailroute::{Mailbox, MailboxError};

/// A message handed to `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// One `list_unread` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub query: String,
    pub page_size: u32,
    pub page_token: Option<String>,
}

#[derive(Default)]
struct State {
    /// Insertion order of messages.
    order: Vec<String>,
    messages: HashMap<String, RawMessage>,
    unread: HashSet<String>,
    /// Scripted listing pages; when unset, unread ids are paged by size.
    pages: Option<Vec<Vec<String>>>,
    fail_fetch: HashSet<String>,
    /// Zero-based listing calls that fail.
    fail_list_calls: HashSet<usize>,
    fail_send: bool,
    fail_mark_read: bool,
    list_calls: Vec<ListCall>,
    fetch_calls: Vec<String>,
    send_attempts: usize,
    sent: Vec<SentMessage>,
    marked_read: Vec<String>,
}

/// Fake mailbox. Configure it before use; inspect it afterwards.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<State>,
    fetch_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unread message.
    pub fn add(&self, message: RawMessage) {
        let mut state = self.state.lock().unwrap();
        state.order.push(message.id.clone());
        state.unread.insert(message.id.clone());
        state.messages.insert(message.id.clone(), message);
    }

    /// Scripts the listing: page `i` is served for token `page-i`.
    pub fn set_pages(&self, pages: &[&[&str]]) {
        self.state.lock().unwrap().pages = Some(
            pages
                .iter()
                .map(|p| p.iter().map(|id| id.to_string()).collect())
                .collect(),
        );
    }

    pub fn fail_fetch(&self, id: &str) {
        self.state.lock().unwrap().fail_fetch.insert(id.to_string());
    }

    pub fn fail_list_call(&self, call_index: usize) {
        self.state.lock().unwrap().fail_list_calls.insert(call_index);
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn fail_mark_read(&self, fail: bool) {
        self.state.lock().unwrap().fail_mark_read = fail;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn list_calls(&self) -> Vec<ListCall> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.state.lock().unwrap().send_attempts
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn marked_read(&self) -> Vec<String> {
        self.state.lock().unwrap().marked_read.clone()
    }

    pub fn is_unread(&self, id: &str) -> bool {
        self.state.lock().unwrap().unread.contains(id)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn page_index(token: Option<&str>, prefix: &str) -> usize {
    token
        .and_then(|t| t.strip_prefix(prefix))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn refs(ids: &[String]) -> Vec<MessageRef> {
    ids.iter()
        .map(|id| MessageRef {
            id: id.clone(),
            thread_id: format!("thread-{}", id),
        })
        .collect()
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_unread(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let mut state = self.state.lock().unwrap();
        let call_index = state.list_calls.len();
        state.list_calls.push(ListCall {
            query: query.to_string(),
            page_size,
            page_token: page_token.map(str::to_string),
        });

        if state.fail_list_calls.contains(&call_index) {
            return Err(MailboxError::Api {
                operation: "messages.list",
                status: 503,
                body: "backend error".to_string(),
            });
        }

        if let Some(pages) = &state.pages {
            let index = page_index(page_token, "page-");
            let ids = pages.get(index).cloned().unwrap_or_default();
            let next_page_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
            return Ok(MessagePage {
                messages: refs(&ids),
                next_page_token,
            });
        }

        let unread: Vec<String> = state
            .order
            .iter()
            .filter(|id| state.unread.contains(*id))
            .cloned()
            .collect();
        let offset = page_index(page_token, "offset-").min(unread.len());
        let end = (offset + page_size as usize).min(unread.len());
        let next_page_token = (end < unread.len()).then(|| format!("offset-{}", end));

        Ok(MessagePage {
            messages: refs(&unread[offset..end]),
            next_page_token,
        })
    }

    async fn get_full(&self, id: &str) -> Result<RawMessage, MailboxError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            state.fetch_calls.push(id.to_string());
            if state.fail_fetch.contains(id) {
                Err(MailboxError::Transport(format!("connection reset fetching {}", id)))
            } else {
                state
                    .messages
                    .get(id)
                    .cloned()
                    .ok_or_else(|| MailboxError::Api {
                        operation: "messages.get",
                        status: 404,
                        body: "not found".to_string(),
                    })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;
        if state.fail_send {
            return Err(MailboxError::Api {
                operation: "messages.send",
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        state.sent.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mark_read {
            return Err(MailboxError::Transport("timed out".to_string()));
        }
        state.unread.remove(id);
        state.marked_read.push(id.to_string());
        Ok(())
    }
}
