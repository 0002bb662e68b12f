//! # Queue ledger operations.
//!
//! [`Ledger`] owns the ordered entry list and the write-ahead discipline:
//! every mutation builds the next state, persists it as a snapshot, and only
//! then commits it in memory. A persistence failure leaves the ledger
//! unchanged and surfaces as [`QueueError::Persist`].
//!
//! ## Rules
//! - Ids are unique across the ledger; re-enqueueing an id whose terminal
//!   `failed` entry is still held for inspection replaces that entry.
//! - At most one entry is `active` at any time.
//! - Only the orchestrator's control loop mutates the ledger (single-writer,
//!   enforced by ownership — the ledger lives inside the orchestrator task).

use std::sync::Arc;

use crate::error::{BootError, PersistError, QueueError};
use crate::ledger::{AssetEntry, EntryStatus};
use crate::persist::{Persistence, QueueSnapshot};
use crate::config::FailurePolicy;
use crate::policies::RetryPolicy;

/// Outcome of recording a failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The entry went back to `queued` at its position; `attempt` is the new
    /// retry counter value.
    Requeued {
        /// New retry counter (1-based attempt index for the next try).
        attempt: u32,
    },
    /// The retry budget is exhausted; the entry is terminally `failed`
    /// (kept or removed per [`FailurePolicy`]).
    Exhausted,
}

/// What startup recovery did to stale entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Ids reclassified `active → queued` (interrupted, budget remaining).
    pub requeued: Vec<String>,
    /// Ids reclassified `active → failed` (interrupted, budget exhausted).
    pub failed: Vec<String>,
}

impl RecoveryReport {
    /// Whether recovery changed anything.
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

/// The durable, ordered broadcast queue.
pub struct Ledger {
    entries: Vec<AssetEntry>,
    store: Arc<dyn Persistence>,
}

impl Ledger {
    /// Loads the persisted queue and reclassifies stale `active` entries.
    ///
    /// No subprocess survives a restart, so an entry found `active` is
    /// reclassified to `queued` (budget remaining — the interrupted run
    /// counts as a failed attempt) or `failed` (budget exhausted). The
    /// recovered state is written back before the ledger is handed out.
    ///
    /// An unreadable or corrupt snapshot is fatal: the caller gets a
    /// [`BootError`] instead of a silently reset queue.
    pub async fn recover(
        store: Arc<dyn Persistence>,
        retry: &RetryPolicy,
    ) -> Result<(Self, RecoveryReport), BootError> {
        let snapshot = store.load_queue().await.map_err(BootError::QueueUnreadable)?;
        let mut entries = snapshot.map(|s| s.entries).unwrap_or_default();
        let mut report = RecoveryReport::default();

        entries.retain(|e| e.status != EntryStatus::Done);
        for entry in &mut entries {
            if entry.status != EntryStatus::Active {
                continue;
            }
            entry.retries += 1;
            if retry.allows(entry.retries) {
                entry.status = EntryStatus::Queued;
                entry.failure = Some("interrupted by restart".to_string());
                report.requeued.push(entry.id.clone());
            } else {
                // Kept regardless of FailurePolicy: recovery failures are
                // exactly what an operator needs to inspect.
                entry.status = EntryStatus::Failed;
                entry.failure = Some("interrupted by restart, retry budget exhausted".to_string());
                report.failed.push(entry.id.clone());
            }
        }

        let mut ledger = Self {
            entries: Vec::new(),
            store,
        };
        if report.is_empty() {
            ledger.entries = entries;
        } else {
            ledger
                .commit(entries)
                .await
                .map_err(BootError::StateUnwritable)?;
        }
        Ok((ledger, report))
    }

    /// Persists `next` and commits it in memory; the ledger is unchanged on
    /// error.
    async fn commit(&mut self, next: Vec<AssetEntry>) -> Result<(), PersistError> {
        self.store.save_queue(&QueueSnapshot::of(&next)).await?;
        self.entries = next;
        Ok(())
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Returns all entries in playback order.
    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }

    /// Returns the entry with the given id.
    pub fn get(&self, id: &str) -> Option<&AssetEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Returns the earliest `queued` entry, if any.
    pub fn peek_next(&self) -> Option<&AssetEntry> {
        self.entries.iter().find(|e| e.status == EntryStatus::Queued)
    }

    /// Returns the `active` entry, if any.
    pub fn active(&self) -> Option<&AssetEntry> {
        self.entries.iter().find(|e| e.status == EntryStatus::Active)
    }

    /// Appends a `queued` entry; returns its position.
    ///
    /// Rejected with [`QueueError::DuplicateAsset`] if the id is already
    /// queued or active. A terminal `failed` entry with the same id is
    /// replaced by the fresh one.
    pub async fn enqueue(
        &mut self,
        id: &str,
        duration_secs: Option<f64>,
    ) -> Result<usize, QueueError> {
        if let Some(existing) = self.get(id) {
            if existing.is_pending() {
                return Err(QueueError::DuplicateAsset { id: id.to_string() });
            }
        }

        let mut next = self.entries.clone();
        next.retain(|e| e.id != id);
        next.push(AssetEntry::queued(id, duration_secs));
        let position = next.len() - 1;
        self.commit(next).await?;
        Ok(position)
    }

    /// Removes a `queued` or `failed` entry.
    ///
    /// An `active` entry is [`QueueError::NotRemovable`]; it must be stopped
    /// through the orchestrator first.
    pub async fn dequeue(&mut self, id: &str) -> Result<(), QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        if self.entries[pos].status == EntryStatus::Active {
            return Err(QueueError::NotRemovable { id: id.to_string() });
        }

        let mut next = self.entries.clone();
        next.remove(pos);
        self.commit(next).await?;
        Ok(())
    }

    /// Moves a `queued` entry to `new_position` (clamped); returns the
    /// position it landed on.
    pub async fn reorder(&mut self, id: &str, new_position: usize) -> Result<usize, QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        let status = self.entries[pos].status;
        if status != EntryStatus::Queued {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                status,
            });
        }

        let mut next = self.entries.clone();
        let entry = next.remove(pos);
        let target = new_position.min(next.len());
        next.insert(target, entry);
        self.commit(next).await?;
        Ok(target)
    }

    /// Transitions a `queued` entry to `active`.
    ///
    /// Rejected while another entry is `active` — the single-active
    /// invariant is enforced here, not assumed.
    pub async fn mark_active(&mut self, id: &str) -> Result<(), QueueError> {
        if let Some(other) = self.active() {
            return Err(QueueError::InvalidState {
                id: other.id.clone(),
                status: EntryStatus::Active,
            });
        }
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        let status = self.entries[pos].status;
        if status != EntryStatus::Queued {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                status,
            });
        }

        let mut next = self.entries.clone();
        next[pos].status = EntryStatus::Active;
        self.commit(next).await?;
        Ok(())
    }

    /// Completes the `active` entry: marked `done` and removed from the
    /// ledger in one durable write.
    pub async fn complete(&mut self, id: &str) -> Result<(), QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        let status = self.entries[pos].status;
        if status != EntryStatus::Active {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                status,
            });
        }

        let mut next = self.entries.clone();
        next.remove(pos);
        self.commit(next).await?;
        Ok(())
    }

    /// Records a failed attempt and applies the bounded-retry policy in one
    /// durable write.
    ///
    /// Within budget the entry returns to `queued` at its position with the
    /// retry counter incremented; otherwise it becomes terminally `failed`
    /// and is kept or removed per `policy`.
    pub async fn record_failure(
        &mut self,
        id: &str,
        reason: &str,
        retry: &RetryPolicy,
        policy: FailurePolicy,
    ) -> Result<FailureDisposition, QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };

        let mut next = self.entries.clone();
        let attempt = next[pos].retries + 1;
        next[pos].retries = attempt;
        next[pos].failure = Some(reason.to_string());

        let disposition = if retry.allows(attempt) {
            next[pos].status = EntryStatus::Queued;
            FailureDisposition::Requeued { attempt }
        } else {
            match policy {
                FailurePolicy::Keep => next[pos].status = EntryStatus::Failed,
                FailurePolicy::Remove => {
                    next.remove(pos);
                }
            }
            FailureDisposition::Exhausted
        };

        self.commit(next).await?;
        Ok(disposition)
    }

    /// Records a deliberate operator skip/stop of the entry.
    ///
    /// Never consumes the retry budget; the entry is marked `failed` with
    /// reason `manual-skip` or removed per `policy`.
    pub async fn record_skip(
        &mut self,
        id: &str,
        policy: FailurePolicy,
    ) -> Result<(), QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };

        let mut next = self.entries.clone();
        match policy {
            FailurePolicy::Keep => {
                next[pos].status = EntryStatus::Failed;
                next[pos].failure = Some("manual-skip".to_string());
            }
            FailurePolicy::Remove => {
                next.remove(pos);
            }
        }
        self.commit(next).await?;
        Ok(())
    }

    /// Returns the `active` entry to `queued` without consuming the retry
    /// budget. Used on graceful shutdown so the next boot resumes at the
    /// same head.
    pub async fn record_interrupted(&mut self, id: &str) -> Result<(), QueueError> {
        let Some(pos) = self.position_of(id) else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        let status = self.entries[pos].status;
        if status != EntryStatus::Active {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                status,
            });
        }

        let mut next = self.entries.clone();
        next[pos].status = EntryStatus::Queued;
        self.commit(next).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryPersistence;

    async fn empty_ledger() -> Ledger {
        let store = Arc::new(MemoryPersistence::new());
        let (ledger, report) = Ledger::recover(store, &RetryPolicy::default())
            .await
            .expect("recover");
        assert!(report.is_empty());
        ledger
    }

    fn active_count(ledger: &Ledger) -> usize {
        ledger
            .entries()
            .iter()
            .filter(|e| e.status == EntryStatus::Active)
            .count()
    }

    #[tokio::test]
    async fn test_enqueue_orders_and_positions() {
        let mut ledger = empty_ledger().await;
        assert_eq!(ledger.enqueue("a", None).await.expect("a"), 0);
        assert_eq!(ledger.enqueue("b", None).await.expect("b"), 1);
        assert_eq!(ledger.peek_next().map(|e| e.id.as_str()), Some("a"));
    }

    #[tokio::test]
    async fn test_duplicate_pending_rejected() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        let err = ledger.enqueue("a", None).await.expect_err("dup");
        assert_eq!(err.as_label(), "queue_duplicate_asset");
    }

    #[tokio::test]
    async fn test_reenqueue_replaces_terminal_failed_entry() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.mark_active("a").await.expect("active");
        let no_retry = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let disposition = ledger
            .record_failure("a", "nonzero-exit", &no_retry, FailurePolicy::Keep)
            .await
            .expect("failure");
        assert_eq!(disposition, FailureDisposition::Exhausted);

        ledger.enqueue("a", None).await.expect("requeue");
        let entry = ledger.get("a").expect("entry");
        assert_eq!(entry.status, EntryStatus::Queued);
        assert_eq!(entry.retries, 0);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_active() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.enqueue("b", None).await.expect("b");
        ledger.mark_active("a").await.expect("activate a");
        assert_eq!(active_count(&ledger), 1);

        let err = ledger.mark_active("b").await.expect_err("second active");
        assert_eq!(err.as_label(), "queue_invalid_state");
        assert_eq!(active_count(&ledger), 1);
    }

    #[tokio::test]
    async fn test_active_entry_not_removable() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.mark_active("a").await.expect("activate");
        let err = ledger.dequeue("a").await.expect_err("remove active");
        assert_eq!(err.as_label(), "queue_not_removable");
    }

    #[tokio::test]
    async fn test_dequeue_missing_is_not_found() {
        let mut ledger = empty_ledger().await;
        let err = ledger.dequeue("ghost").await.expect_err("missing");
        assert_eq!(err.as_label(), "queue_not_found");
    }

    #[tokio::test]
    async fn test_reorder_requires_queued() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.enqueue("b", None).await.expect("b");
        ledger.mark_active("a").await.expect("activate");

        let err = ledger.reorder("a", 1).await.expect_err("reorder active");
        assert_eq!(err.as_label(), "queue_invalid_state");

        ledger.enqueue("c", None).await.expect("c");
        ledger.reorder("c", 1).await.expect("reorder c");
        let ids: Vec<&str> = ledger.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_complete_removes_entry() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.enqueue("b", None).await.expect("b");
        ledger.mark_active("a").await.expect("activate");
        ledger.complete("a").await.expect("complete");

        assert!(ledger.get("a").is_none());
        assert_eq!(ledger.peek_next().map(|e| e.id.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn test_failure_requeues_within_budget_then_exhausts() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.mark_active("a").await.expect("activate");

        let retry = RetryPolicy::default(); // budget: 1 automatic retry
        let first = ledger
            .record_failure("a", "nonzero-exit", &retry, FailurePolicy::Keep)
            .await
            .expect("first failure");
        assert_eq!(first, FailureDisposition::Requeued { attempt: 1 });
        assert_eq!(ledger.get("a").map(|e| e.status), Some(EntryStatus::Queued));

        ledger.mark_active("a").await.expect("activate again");
        let second = ledger
            .record_failure("a", "nonzero-exit", &retry, FailurePolicy::Keep)
            .await
            .expect("second failure");
        assert_eq!(second, FailureDisposition::Exhausted);
        assert_eq!(ledger.get("a").map(|e| e.status), Some(EntryStatus::Failed));
        assert!(ledger.peek_next().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_entry_removed_under_remove_policy() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.mark_active("a").await.expect("activate");

        let no_retry = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let disposition = ledger
            .record_failure("a", "stalled", &no_retry, FailurePolicy::Remove)
            .await
            .expect("failure");
        assert_eq!(disposition, FailureDisposition::Exhausted);
        assert!(ledger.get("a").is_none());
    }

    #[tokio::test]
    async fn test_skip_does_not_consume_budget() {
        let mut ledger = empty_ledger().await;
        ledger.enqueue("a", None).await.expect("a");
        ledger.mark_active("a").await.expect("activate");
        ledger.record_skip("a", FailurePolicy::Keep).await.expect("skip");

        let entry = ledger.get("a").expect("entry");
        assert_eq!(entry.status, EntryStatus::Failed);
        assert_eq!(entry.retries, 0);
        assert_eq!(entry.failure.as_deref(), Some("manual-skip"));
    }

    #[tokio::test]
    async fn test_recovery_requeues_active_within_budget() {
        let entries = vec![{
            let mut e = AssetEntry::queued("a", None);
            e.status = EntryStatus::Active;
            e
        }];
        let store = Arc::new(MemoryPersistence::with_queue(QueueSnapshot::of(&entries)));

        let (ledger, report) = Ledger::recover(store, &RetryPolicy::default())
            .await
            .expect("recover");
        assert_eq!(report.requeued, vec!["a".to_string()]);
        let entry = ledger.get("a").expect("entry");
        assert_eq!(entry.status, EntryStatus::Queued);
        assert_eq!(entry.retries, 1);
    }

    #[tokio::test]
    async fn test_recovery_fails_active_beyond_budget() {
        let entries = vec![{
            let mut e = AssetEntry::queued("a", None);
            e.status = EntryStatus::Active;
            e.retries = 1; // already used its single retry
            e
        }];
        let store = Arc::new(MemoryPersistence::with_queue(QueueSnapshot::of(&entries)));

        let (ledger, report) = Ledger::recover(store, &RetryPolicy::default())
            .await
            .expect("recover");
        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(ledger.get("a").map(|e| e.status), Some(EntryStatus::Failed));
    }

    #[tokio::test]
    async fn test_recovery_persists_reclassification() {
        let entries = vec![{
            let mut e = AssetEntry::queued("a", None);
            e.status = EntryStatus::Active;
            e
        }];
        let store = Arc::new(MemoryPersistence::with_queue(QueueSnapshot::of(&entries)));

        let _ = Ledger::recover(Arc::clone(&store) as Arc<dyn Persistence>, &RetryPolicy::default())
            .await
            .expect("recover");

        // A second recovery sees the already-reclassified state.
        let (ledger, report) = Ledger::recover(store, &RetryPolicy::default())
            .await
            .expect("recover again");
        assert!(report.is_empty());
        assert_eq!(ledger.get("a").map(|e| e.status), Some(EntryStatus::Queued));
    }
}
