//! Per-run orchestration: fetch, route, forward, record, mark read.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::db::record_repo::{self, ProcessingRecord, RecordStatus};
use crate::db::{now_rfc3339, Database, DatabaseError};
use crate::mailbox::Mailbox;
use crate::routing::{self, RoutingError};

use super::fetcher::{BatchFetcher, FetchError, DEFAULT_BATCH_SIZE, DEFAULT_MAX_BATCHES};
use super::forward::ForwardTemplate;
use super::parser::FetchedMessage;

/// Error text stored for subjects that do not follow the routing convention.
pub const NO_RULE_ERROR: &str = "subject does not match forwarding rule";

/// Errors from the intake pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("An intake run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Terminal state of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A record already existed; nothing was touched.
    SkippedDuplicate,
    /// The subject did not follow the convention; recorded and marked read.
    SkippedNoRule,
    /// Sending failed; recorded and marked read.
    ForwardFailed,
    Forwarded,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub fetched: usize,
    pub forwarded: usize,
    pub forward_failed: usize,
    pub skipped_no_rule: usize,
    pub skipped_duplicate: usize,
    /// Messages whose processing returned an error (unresolved destination,
    /// storage failure). They stay unread unless recorded otherwise.
    pub errors: usize,
}

impl RunSummary {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::SkippedDuplicate => self.skipped_duplicate += 1,
            Outcome::SkippedNoRule => self.skipped_no_rule += 1,
            Outcome::ForwardFailed => self.forward_failed += 1,
            Outcome::Forwarded => self.forwarded += 1,
        }
    }
}

/// The intake pipeline. One run at a time per instance.
pub struct IntakePipeline {
    db: Database,
    mailbox: Arc<dyn Mailbox>,
    fetcher: BatchFetcher,
    template: ForwardTemplate,
    batch_size: u32,
    max_batches: u32,
    run_lock: Mutex<()>,
}

impl IntakePipeline {
    /// Creates a pipeline with a default fetcher over the same mailbox.
    pub fn new(db: Database, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            db,
            fetcher: BatchFetcher::new(Arc::clone(&mailbox)),
            mailbox,
            template: ForwardTemplate::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: DEFAULT_MAX_BATCHES,
            run_lock: Mutex::new(()),
        }
    }

    /// Replaces the fetcher, e.g. to change concurrency or page delay.
    pub fn with_fetcher(mut self, fetcher: BatchFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_template(mut self, template: ForwardTemplate) -> Self {
        self.template = template;
        self
    }

    /// Sets the page size and page cap used by each run.
    pub fn with_batch_limits(mut self, batch_size: u32, max_batches: u32) -> Self {
        self.batch_size = batch_size;
        self.max_batches = max_batches;
        self
    }

    /// Runs one intake pass over the unread mailbox.
    ///
    /// Returns [`PipelineError::AlreadyRunning`] without contacting the
    /// mailbox when another run holds this pipeline. Per-message failures
    /// are counted in the summary and never abort the run.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        self.run_locked().instrument(info_span!("intake_run")).await
    }

    async fn run_locked(&self) -> Result<RunSummary, PipelineError> {
        let messages = self
            .fetcher
            .fetch_unread(self.batch_size, self.max_batches)
            .await?;

        let mut summary = RunSummary {
            fetched: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            debug!("No unread messages");
            return Ok(summary);
        }

        for message in &messages {
            let span = info_span!("process_message", message_id = %message.id);
            match self.process_message(message).instrument(span).await {
                Ok(outcome) => summary.count(outcome),
                Err(e) => {
                    summary.errors += 1;
                    error!("Failed to process message {}: {}", message.id, e);
                }
            }
        }

        info!(
            "Intake run complete: {} fetched, {} forwarded, {} forward failures, {} without rule, {} duplicates, {} errors",
            summary.fetched,
            summary.forwarded,
            summary.forward_failed,
            summary.skipped_no_rule,
            summary.skipped_duplicate,
            summary.errors
        );

        Ok(summary)
    }

    /// Processes one message through to its terminal state.
    ///
    /// An unresolved destination is recorded and then returned as an error;
    /// that message is left unread.
    pub async fn process_message(&self, message: &FetchedMessage) -> Result<Outcome, PipelineError> {
        if record_repo::find_by_provider_id(&self.db, &message.id)?.is_some() {
            debug!("Message {} already has a record, skipping", message.id);
            return Ok(Outcome::SkippedDuplicate);
        }

        let route = routing::parse_subject(&message.subject);
        let mut record = new_record(message);

        if route.is_empty() {
            record.error = Some(NO_RULE_ERROR.to_string());
            if !self.persist(&record)? {
                return Ok(Outcome::SkippedDuplicate);
            }
            self.mark_read(&message.id).await;
            info!("Message {} does not match the forwarding rule", message.id);
            return Ok(Outcome::SkippedNoRule);
        }

        record.keyword = Some(route.keyword.clone());

        let destination = match routing::resolve(&self.db, &route.keyword, &route.target) {
            Ok(destination) => destination,
            Err(e) => {
                record.error = Some(e.to_string());
                if !self.persist(&record)? {
                    return Ok(Outcome::SkippedDuplicate);
                }
                return Err(e.into());
            }
        };

        record.destination_name = Some(destination.name.clone());
        record.destination_email = Some(destination.email.clone());

        let subject = self.template.subject(message);
        let body = self.template.html_body(message);
        let outcome = match self.mailbox.send(&destination.email, &subject, &body).await {
            Ok(()) => {
                record.status = RecordStatus::Success;
                record.processed_at = Some(now_rfc3339());
                info!("Forwarded message {} to {}", message.id, destination.email);
                Outcome::Forwarded
            }
            Err(e) => {
                record.error = Some(format!("forward failed: {}", e));
                error!("Failed to forward message {}: {}", message.id, e);
                Outcome::ForwardFailed
            }
        };

        if !self.persist(&record)? {
            warn!(
                "Message {} was recorded concurrently after being sent",
                message.id
            );
        }
        self.mark_read(&message.id).await;

        Ok(outcome)
    }

    /// Stores the record. Returns `false` when a record for the same
    /// provider id already exists.
    fn persist(&self, record: &ProcessingRecord) -> Result<bool, DatabaseError> {
        match record_repo::insert(&self.db, record) {
            Ok(()) => Ok(true),
            Err(DatabaseError::Duplicate { .. }) => {
                debug!(
                    "Record for message {} already exists",
                    record.provider_message_id
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_read(&self, id: &str) {
        if let Err(e) = self.mailbox.mark_read(id).await {
            warn!("Failed to mark message {} as read: {}", id, e);
        }
    }
}

/// A failed record carrying the message snapshot; callers fill in the rest.
fn new_record(message: &FetchedMessage) -> ProcessingRecord {
    let now = now_rfc3339();
    ProcessingRecord {
        id: Uuid::new_v4().to_string(),
        provider_message_id: message.id.clone(),
        subject: message.subject.clone(),
        from_email: message.from.clone(),
        to_email: message.to.clone(),
        content: message.body.clone(),
        keyword: None,
        destination_name: None,
        destination_email: None,
        status: RecordStatus::Failed,
        error: None,
        processed_at: None,
        created_at: now.clone(),
        updated_at: now,
        deleted_at: None,
    }
}
