//! Notification dispatcher — scans for due, unsent blocks and sends one
//! reminder email per block.
//!
//! Delivery is at-least-once-per-success: the sent flag is written only
//! after the transport confirms the send, so a crash in between leaves the
//! block eligible for a duplicate on the next run. The flag update itself
//! is a conditional false→true claim, so non-overlapping runs are
//! idempotent and overlapping ones cannot double-mark.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use studybell_core::error::Result;
use studybell_mailer::ReminderSender;
use studybell_store::BlockStore;

/// Per-block outcome of one dispatcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Email accepted by the transport and flag set.
    Sent,
    /// Transport refused the send; block left unmarked for the next run.
    Failed,
    /// Fault while marking the block; the batch continued.
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockOutcome {
    pub id: String,
    pub email: String,
    pub subject: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one dispatcher run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub timestamp: DateTime<Utc>,
    pub total_blocks: i64,
    pub processed: usize,
    pub results: Vec<BlockOutcome>,
    pub sent: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Finds due blocks and sends their reminders.
pub struct NotificationDispatcher {
    store: Arc<BlockStore>,
    sender: Arc<dyn ReminderSender>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<BlockStore>, sender: Arc<dyn ReminderSender>) -> Self {
        Self { store, sender }
    }

    /// One scan-and-send cycle at instant `now`. One block's failure never
    /// aborts the batch.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DispatchSummary> {
        let total_blocks = self.store.total_blocks()?;
        let due = self.store.due_unsent(now)?;
        tracing::info!("🔔 Dispatcher run: {} of {} block(s) due", due.len(), total_blocks);

        let mut results = Vec::with_capacity(due.len());
        for block in &due {
            let outcome = match self.sender.send(&block.owner_email, &block.subject, block.start_time).await
            {
                Ok(message_id) => match self.store.mark_sent(&block.id, now) {
                    Ok(claimed) => {
                        if !claimed {
                            tracing::warn!(
                                "⚠️ Block {} was already marked sent by a concurrent run",
                                block.id
                            );
                        }
                        BlockOutcome {
                            id: block.id.clone(),
                            email: block.owner_email.clone(),
                            subject: block.subject.clone(),
                            status: OutcomeStatus::Sent,
                            message_id: Some(message_id),
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::error!("💥 Failed to mark block {} as sent: {e}", block.id);
                        BlockOutcome {
                            id: block.id.clone(),
                            email: block.owner_email.clone(),
                            subject: block.subject.clone(),
                            status: OutcomeStatus::Error,
                            message_id: Some(message_id),
                            error: Some(e.to_string()),
                        }
                    }
                },
                Err(e) => {
                    // left unmarked: eligible again on the next run
                    tracing::warn!("❌ Reminder for '{}' failed: {e}", block.subject);
                    BlockOutcome {
                        id: block.id.clone(),
                        email: block.owner_email.clone(),
                        subject: block.subject.clone(),
                        status: OutcomeStatus::Failed,
                        message_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(outcome);
        }

        let sent = results.iter().filter(|r| r.status == OutcomeStatus::Sent).count();
        let failed = results.iter().filter(|r| r.status == OutcomeStatus::Failed).count();
        let errors = results.iter().filter(|r| r.status == OutcomeStatus::Error).count();
        tracing::info!("📊 Dispatcher done: sent={sent} failed={failed} errors={errors}");

        Ok(DispatchSummary {
            timestamp: now,
            total_blocks,
            processed: due.len(),
            results,
            sent,
            failed,
            errors,
        })
    }
}

/// Run the dispatcher on a fixed interval. Each run is awaited to
/// completion before the next tick, so invocations never overlap.
pub async fn run_loop(dispatcher: Arc<NotificationDispatcher>, check_interval_secs: u64) {
    tracing::info!("⏰ Dispatcher loop started (check every {check_interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = dispatcher.run(Utc::now()).await {
            tracing::error!("💥 Dispatcher run failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;
    use studybell_core::error::StudybellError;
    use studybell_store::NewStudyBlock;

    /// Records sends; fails when the recipient matches `fail_for`.
    struct MockSender {
        sent: Mutex<Vec<(String, String)>>,
        fail_for: Option<String>,
    }

    impl MockSender {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_for: None }
        }

        fn failing_for(recipient: &str) -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_for: Some(recipient.into()) }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReminderSender for MockSender {
        async fn send(
            &self,
            recipient: &str,
            subject: &str,
            _start_time: DateTime<Utc>,
        ) -> studybell_core::error::Result<String> {
            if self.fail_for.as_deref() == Some(recipient) {
                return Err(StudybellError::Send("relay rejected the message".into()));
            }
            self.sent.lock().unwrap().push((recipient.to_string(), subject.to_string()));
            Ok(format!("<msg-{}@test>", self.sent_count()))
        }
    }

    fn block(owner: &str, subject: &str, start: DateTime<Utc>, minutes: i64) -> NewStudyBlock {
        NewStudyBlock {
            owner_id: owner.into(),
            owner_email: format!("{owner}@example.com"),
            subject: subject.into(),
            duration_minutes: minutes as u32,
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            notification_time: start - Duration::minutes(10),
        }
    }

    #[tokio::test]
    async fn sends_due_block_and_marks_it() {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let now = Utc::now();

        // notification_time = now - 1s, start_time = now + 9m59s
        let start = now + Duration::minutes(9) + Duration::seconds(59);
        let id = store.insert(&block("u1", "Math", start, 30)).unwrap();

        let sender = Arc::new(MockSender::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender.clone());

        let summary = dispatcher.run(now).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.results[0].id, id);
        assert_eq!(summary.results[0].status, OutcomeStatus::Sent);
        assert!(summary.results[0].message_id.is_some());
        assert_eq!(sender.sent_count(), 1);

        let stored = &store.list_by_owner("u1").unwrap()[0];
        assert!(stored.notification_sent);
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let now = Utc::now();
        store.insert(&block("u1", "Math", now + Duration::minutes(5), 30)).unwrap();

        let sender = Arc::new(MockSender::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender.clone());

        let first = dispatcher.run(now).await.unwrap();
        assert_eq!(first.sent, 1);

        let second = dispatcher.run(now).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.sent, 0);
        assert_eq!(sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn skips_blocks_outside_the_window() {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let now = Utc::now();

        // start already passed — never notified late
        store.insert(&block("u1", "Late", now - Duration::minutes(1), 30)).unwrap();
        // notification not yet due
        store.insert(&block("u1", "Early", now + Duration::minutes(60), 30)).unwrap();

        let sender = Arc::new(MockSender::new());
        let dispatcher = NotificationDispatcher::new(store, sender.clone());

        let summary = dispatcher.run(now).await.unwrap();
        assert_eq!(summary.total_blocks, 2);
        assert_eq!(summary.processed, 0);
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_leaves_block_eligible_for_retry() {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let now = Utc::now();
        store.insert(&block("u1", "Math", now + Duration::minutes(5), 30)).unwrap();

        let failing = Arc::new(MockSender::failing_for("u1@example.com"));
        let dispatcher = NotificationDispatcher::new(store.clone(), failing);

        let summary = dispatcher.run(now).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 0);
        assert!(summary.results[0].error.as_deref().unwrap().contains("relay rejected"));

        // still unmarked, so a working sender picks it up next run
        let retry_sender = Arc::new(MockSender::new());
        let dispatcher = NotificationDispatcher::new(store, retry_sender.clone());
        let retry = dispatcher.run(now).await.unwrap();
        assert_eq!(retry.sent, 1);
        assert_eq!(retry_sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let now = Utc::now();
        store.insert(&block("u1", "Math", now + Duration::minutes(5), 30)).unwrap();
        store.insert(&block("u2", "Physics", now + Duration::minutes(6), 30)).unwrap();

        let sender = Arc::new(MockSender::failing_for("u1@example.com"));
        let dispatcher = NotificationDispatcher::new(store.clone(), sender.clone());

        let summary = dispatcher.run(now).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);

        // only the successful block is marked
        assert!(!store.list_by_owner("u1").unwrap()[0].notification_sent);
        assert!(store.list_by_owner("u2").unwrap()[0].notification_sent);
    }
}
