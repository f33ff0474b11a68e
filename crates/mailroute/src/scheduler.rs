//! Periodic intake scheduler with a manual trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::intake::{IntakePipeline, PipelineError};

/// Drives [`IntakePipeline::run`] on a fixed interval.
pub struct IntakeScheduler {
    pipeline: Arc<IntakePipeline>,
    interval: Duration,
    run_on_start: bool,
    shutdown: Arc<AtomicBool>,
    trigger_tx: broadcast::Sender<()>,
}

impl IntakeScheduler {
    /// Creates a scheduler. The first run happens one interval after start
    /// unless [`IntakeScheduler::with_run_on_start`] is set.
    pub fn new(pipeline: Arc<IntakePipeline>, interval: Duration) -> Self {
        let (trigger_tx, _) = broadcast::channel(16);
        Self {
            pipeline,
            interval,
            run_on_start: false,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger_tx,
        }
    }

    /// Runs once immediately when the loop starts.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Starts the loop on the current Tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let run_on_start = self.run_on_start;
        let mut trigger_rx = self.trigger_tx.subscribe();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !run_on_start {
                interval_timer.tick().await; // skip immediate first tick
            }

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        log::info!("Manual intake run triggered");
                    },
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                match pipeline.run().await {
                    Ok(summary) if summary.fetched > 0 => {
                        log::info!(
                            "Intake: {} forwarded of {} fetched",
                            summary.forwarded,
                            summary.fetched
                        );
                    }
                    Ok(_) => {}
                    Err(PipelineError::AlreadyRunning) => {
                        log::info!("Previous intake run still in progress, skipping");
                    }
                    Err(e) => log::error!("Intake run failed: {}", e),
                }
            }

            log::info!("Intake scheduler stopped");
        })
    }

    /// Requests an immediate run. Returns `false` when the loop is not running.
    pub fn trigger_run(&self) -> bool {
        self.trigger_tx.send(()).is_ok()
    }

    /// Signals the loop to stop. An in-flight run completes first.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        // Wake the select loop so it sees the shutdown flag.
        let _ = self.trigger_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::mailbox::{Mailbox, MailboxError, MessagePage, RawMessage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingMailbox {
        lists: AtomicUsize,
    }

    #[async_trait]
    impl Mailbox for CountingMailbox {
        async fn list_unread(
            &self,
            _query: &str,
            _page_size: u32,
            _page_token: Option<&str>,
        ) -> Result<MessagePage, MailboxError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(MessagePage::default())
        }

        async fn get_full(&self, id: &str) -> Result<RawMessage, MailboxError> {
            Err(MailboxError::Transport(id.to_string()))
        }

        async fn send(&self, _to: &str, _subject: &str, _html: &str) -> Result<(), MailboxError> {
            Ok(())
        }

        async fn mark_read(&self, _id: &str) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    fn scheduler(mailbox: Arc<CountingMailbox>, interval: Duration) -> IntakeScheduler {
        let db = Database::open_in_memory().unwrap();
        let pipeline = Arc::new(IntakePipeline::new(db, mailbox));
        IntakeScheduler::new(pipeline, interval)
    }

    #[tokio::test]
    async fn test_scheduler_shutdown() {
        let mailbox = Arc::new(CountingMailbox::default());
        let scheduler = scheduler(mailbox, Duration::from_millis(50));
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .expect("scheduler task panicked");
    }

    #[tokio::test]
    async fn test_run_on_start() {
        let mailbox = Arc::new(CountingMailbox::default());
        let scheduler = scheduler(mailbox.clone(), Duration::from_secs(3600))
            .with_run_on_start(true);
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        handle.await.unwrap();

        assert_eq!(mailbox.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let mailbox = Arc::new(CountingMailbox::default());
        let scheduler = scheduler(mailbox.clone(), Duration::from_secs(3600));
        let handle = scheduler.start();

        // Let the loop reach its select before triggering.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.trigger_run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        handle.await.unwrap();

        assert_eq!(mailbox.lists.load(Ordering::SeqCst), 1);
    }
}
