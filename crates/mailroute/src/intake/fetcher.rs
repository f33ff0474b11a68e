//! Paginated retrieval of unread messages with bounded concurrent detail fetch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::mailbox::{Mailbox, MailboxError, UNREAD_QUERY};

use super::parser::{self, FetchedMessage};

/// Default number of ids requested per listing page.
pub const DEFAULT_BATCH_SIZE: u32 = 50;
/// Largest page the provider serves.
pub const MAX_BATCH_SIZE: u32 = 500;
/// Default cap on listing pages per fetch.
pub const DEFAULT_MAX_BATCHES: u32 = 10;
/// Default number of detail fetches in flight per page.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Default pause between listing pages.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(50);

/// Errors that abort a fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to list unread messages: {0}")]
    List(#[source] MailboxError),
}

/// Walks the unread listing page by page and fetches each new message.
pub struct BatchFetcher {
    mailbox: Arc<dyn Mailbox>,
    concurrency: usize,
    page_delay: Duration,
}

impl BatchFetcher {
    /// Creates a fetcher with default concurrency and page delay.
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            concurrency: DEFAULT_CONCURRENCY,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Sets the number of detail fetches allowed in flight. Zero means one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the pause inserted between listing pages.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Fetches up to `max_batches` pages of up to `batch_size` unread messages.
    ///
    /// Ids repeated across pages are fetched once. A message whose detail
    /// fetch fails is skipped. Only a failure to list the first page is an
    /// error; a later listing failure ends pagination with what was gathered.
    pub async fn fetch_unread(
        &self,
        batch_size: u32,
        max_batches: u32,
    ) -> Result<Vec<FetchedMessage>, FetchError> {
        let batch_size = normalize_batch_size(batch_size);
        let max_batches = normalize_max_batches(max_batches);

        let mut seen: HashSet<String> = HashSet::new();
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;

        for batch in 0..max_batches {
            if batch > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page = match self
                .mailbox
                .list_unread(UNREAD_QUERY, batch_size, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if batch == 0 => return Err(FetchError::List(e)),
                Err(e) => {
                    warn!(
                        "Listing page {} failed, keeping {} messages already fetched: {}",
                        batch + 1,
                        messages.len(),
                        e
                    );
                    return Ok(messages);
                }
            };

            let next_token = page.next_token().map(str::to_string);
            let fresh: Vec<String> = page
                .messages
                .into_iter()
                .map(|m| m.id)
                .filter(|id| seen.insert(id.clone()))
                .collect();

            debug!("Page {}: {} new message ids", batch + 1, fresh.len());
            messages.extend(self.fetch_details(fresh).await);

            match next_token {
                Some(token) => page_token = Some(token),
                None => {
                    debug!("Listing exhausted after {} pages", batch + 1);
                    return Ok(messages);
                }
            }
        }

        info!(
            "Reached the cap of {} pages; remaining unread messages wait for the next run",
            max_batches
        );
        Ok(messages)
    }

    /// Fetches and parses the given ids concurrently, keeping listing order.
    async fn fetch_details(&self, ids: Vec<String>) -> Vec<FetchedMessage> {
        if ids.is_empty() {
            return Vec::new();
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, id) in ids.into_iter().enumerate() {
            let mailbox = Arc::clone(&self.mailbox);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = permits.acquire_owned().await.ok();
                let result = mailbox.get_full(&id).await;
                (index, id, result)
            });
        }

        let mut slots: Vec<Option<FetchedMessage>> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(raw))) => {
                    if slots.len() <= index {
                        slots.resize_with(index + 1, || None);
                    }
                    slots[index] = Some(parser::parse(&raw));
                }
                Ok((_, id, Err(e))) => {
                    warn!("Failed to fetch message {}: {}", id, e);
                }
                Err(e) => {
                    warn!("Message fetch task failed: {}", e);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

/// Zero selects the default; anything above the provider maximum is capped.
pub fn normalize_batch_size(batch_size: u32) -> u32 {
    match batch_size {
        0 => DEFAULT_BATCH_SIZE,
        n => n.min(MAX_BATCH_SIZE),
    }
}

/// Zero selects the default.
pub fn normalize_max_batches(max_batches: u32) -> u32 {
    match max_batches {
        0 => DEFAULT_MAX_BATCHES,
        n => n,
    }
}
