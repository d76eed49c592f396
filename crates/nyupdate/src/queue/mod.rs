//! Durable retry queue.
//!
//! Items whose immediate dispatch retries were exhausted wait here and are
//! re-attempted once per cycle. Each failed pass increments the item's cycle
//! count; when the count reaches the cycle budget the item is written to the
//! [`FailureLog`] and dropped from the queue.
//!
//! The queue file is rewritten atomically after every pass, so a crash loses
//! at most the pass in flight.

mod failures;

pub use failures::FailureLog;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use nyupdate_core::emit;
use nyupdate_core::metrics::events::{DispatchOrigin, ItemDispatched, ItemEscalated, QueueDepth};
use nyupdate_core::statefile;
use nyupdate_core::StateFileError;

use crate::dispatch::{DispatchOutcome, Dispatcher};

/// Counts from one [`RetryQueue::retry_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySummary {
    /// Dispatched and removed.
    pub added: usize,
    /// Failed again, still queued.
    pub requeued: usize,
    /// Moved to the failure record.
    pub escalated: usize,
    /// The pass stopped early because of shutdown.
    pub interrupted: bool,
    /// The queue file could not be rewritten after the pass.
    pub save_failed: bool,
}

/// Queue of item keys with the number of failed retry passes each survived.
#[derive(Debug)]
pub struct RetryQueue {
    path: PathBuf,
    items: IndexMap<String, u32>,
    cycle_budget: u32,
    failures: FailureLog,
    /// The queue file is behind the in-memory queue.
    dirty: bool,
}

impl RetryQueue {
    /// Create an empty queue backed by `path`.
    pub fn new(path: impl Into<PathBuf>, cycle_budget: u32, failures: FailureLog) -> Self {
        Self {
            path: path.into(),
            items: IndexMap::new(),
            cycle_budget,
            failures,
            dirty: false,
        }
    }

    /// Load the queue from `path`. A missing file is an empty queue.
    pub async fn load(
        path: impl Into<PathBuf>,
        cycle_budget: u32,
        failures: FailureLog,
    ) -> Result<Self, StateFileError> {
        let mut queue = Self::new(path, cycle_budget, failures);
        let state = statefile::load_optional(&queue.path).await?;
        queue.items = state
            .entries
            .into_iter()
            .map(|(key, cycles)| (key, u32::try_from(cycles).unwrap_or(u32::MAX)))
            .collect();

        if !queue.items.is_empty() {
            info!(
                file = %queue.path.display(),
                items = queue.items.len(),
                "Loaded retry queue"
            );
        }
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item_key: &str) -> bool {
        self.items.contains_key(item_key)
    }

    /// Whether the queue changed since it was last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Failed retry passes survived by `item_key`.
    pub fn cycles(&self, item_key: &str) -> Option<u32> {
        self.items.get(item_key).copied()
    }

    /// Queued keys with their cycle counts, in queue order.
    pub fn items(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(key, cycles)| (key.as_str(), *cycles))
    }

    /// Add `item_key` at cycle count 0.
    ///
    /// Returns false, leaving the count untouched, if it is already queued.
    pub fn enqueue(&mut self, item_key: &str) -> bool {
        if self.items.contains_key(item_key) {
            debug!(item = item_key, "Item already queued");
            return false;
        }
        self.items.insert(item_key.to_string(), 0);
        self.dirty = true;
        true
    }

    /// Re-attempt every queued item once, then persist the queue.
    ///
    /// An empty queue is only saved if an earlier save failed.
    pub async fn retry_all(&mut self, dispatcher: &Dispatcher) -> RetrySummary {
        let mut summary = RetrySummary::default();
        if self.items.is_empty() {
            if self.dirty {
                summary.save_failed = self.save_after_pass().await;
            }
            return summary;
        }

        info!("Retrying torrents from queue...");

        let keys: Vec<String> = self.items.keys().cloned().collect();
        for key in keys {
            if dispatcher.is_shutdown() {
                summary.interrupted = true;
                break;
            }

            info!(item = %key, "Attempting to add torrent '{key}' to queue...");
            match dispatcher.send(&key).await {
                DispatchOutcome::Added => {
                    info!(item = %key, "Success!");
                    self.items.shift_remove(&key);
                    emit!(ItemDispatched {
                        origin: DispatchOrigin::Queue,
                    });
                    summary.added += 1;
                }
                DispatchOutcome::Failed => {
                    if self.record_failed_pass(&key, dispatcher.attempts()).await {
                        summary.escalated += 1;
                    } else {
                        summary.requeued += 1;
                    }
                }
                DispatchOutcome::Interrupted => {
                    debug!(item = %key, "Retry interrupted by shutdown, item stays queued");
                    summary.interrupted = true;
                    break;
                }
            }
        }

        summary.save_failed = self.save_after_pass().await;
        summary
    }

    /// Returns true if the save failed.
    async fn save_after_pass(&mut self) -> bool {
        match self.persist().await {
            Ok(()) => false,
            Err(e) => {
                error!(error = %e, "Failed to persist retry queue, keeping previous file");
                true
            }
        }
    }

    /// Bump the cycle count of `key`; escalate once the budget is reached.
    ///
    /// Returns true if the item left the queue for the failure record.
    async fn record_failed_pass(&mut self, key: &str, attempts: u32) -> bool {
        let Some(cycles) = self.items.get_mut(key) else {
            return false;
        };
        *cycles = cycles.saturating_add(1);
        let cycles = *cycles;

        if cycles < self.cycle_budget {
            warn!(
                item = key,
                cycles,
                "Failed to queue torrent after {attempts} tries and {cycles} cycles, retrying in next cycle."
            );
            return false;
        }

        if let Err(e) = self.failures.record(key).await {
            error!(
                item = key,
                error = %e,
                file = %self.failures.path().display(),
                "Failed to write failure record, item stays queued"
            );
            return false;
        }

        error!(
            item = key,
            cycles,
            "Failed to queue torrent after {attempts} tries and {cycles} cycles, human intervention required."
        );
        self.items.shift_remove(key);
        emit!(ItemEscalated);
        true
    }

    /// Atomically rewrite the queue file with the current content.
    ///
    /// On failure the queue stays dirty and the next pass saves it again.
    pub async fn persist(&mut self) -> Result<(), StateFileError> {
        emit!(QueueDepth {
            depth: self.items.len(),
        });
        let result = statefile::save(
            &self.path,
            self.items
                .iter()
                .map(|(key, cycles)| (key.as_str(), u64::from(*cycles))),
            true,
        )
        .await;
        self.dirty = result.is_err();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedAction;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const BUDGET: u32 = 3;

    fn queue_in(dir: &TempDir) -> RetryQueue {
        RetryQueue::new(
            dir.path().join("queue"),
            BUDGET,
            FailureLog::new(dir.path().join("fails")),
        )
    }

    fn dispatcher(action: &Arc<ScriptedAction>) -> Dispatcher {
        Dispatcher::new(action.clone(), 2, Duration::ZERO, CancellationToken::new())
    }

    fn fails(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("fails"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);

        assert!(queue.enqueue("a"));
        queue.items.insert("a".to_string(), 2);
        assert!(!queue.enqueue("a"));

        assert_eq!(queue.cycles("a"), Some(2));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_does_nothing() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());

        let summary = queue.retry_all(&dispatcher(&action)).await;

        assert_eq!(summary, RetrySummary::default());
        assert!(action.history().is_empty());
        assert!(!queue.path().exists());
    }

    #[tokio::test]
    async fn test_success_removes_item() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        queue.enqueue("a");

        let summary = queue.retry_all(&dispatcher(&action)).await;

        assert_eq!(summary.added, 1);
        assert!(queue.is_empty());
        let on_disk = statefile::load(queue.path()).await.unwrap();
        assert!(on_disk.entries.is_empty());
    }

    #[tokio::test]
    async fn test_failure_increments_cycle_count() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        action.fail_always("a");
        queue.enqueue("a");

        let summary = queue.retry_all(&dispatcher(&action)).await;

        assert_eq!(summary.requeued, 1);
        assert_eq!(queue.cycles("a"), Some(1));
        assert_eq!(action.calls("a"), 2);
        let on_disk = statefile::load(queue.path()).await.unwrap();
        assert_eq!(on_disk.entries["a"], 1);
    }

    #[tokio::test]
    async fn test_escalates_exactly_when_budget_is_reached() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        action.fail_always("a");
        queue.enqueue("a");
        let d = dispatcher(&action);

        for pass in 1..BUDGET {
            let summary = queue.retry_all(&d).await;
            assert_eq!(summary.escalated, 0, "escalated early on pass {pass}");
            assert_eq!(queue.cycles("a"), Some(pass));
            assert!(fails(&dir).is_empty());
        }

        let summary = queue.retry_all(&d).await;
        assert_eq!(summary.escalated, 1);
        assert!(!queue.contains("a"));
        assert_eq!(fails(&dir), vec!["a".to_string()]);

        let on_disk = statefile::load(queue.path()).await.unwrap();
        assert!(!on_disk.entries.contains_key("a"));
    }

    #[tokio::test]
    async fn test_item_one_below_budget_is_escalated_on_next_failure() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        action.fail_always("a");
        action.fail_always("b");
        queue.items.insert("a".to_string(), BUDGET - 1);
        queue.items.insert("b".to_string(), 0);

        queue.retry_all(&dispatcher(&action)).await;

        assert!(!queue.contains("a"));
        assert_eq!(queue.cycles("b"), Some(1));
        assert_eq!(fails(&dir), vec!["a".to_string()]);
        let on_disk = statefile::load(queue.path()).await.unwrap();
        assert_eq!(on_disk.entries.len(), 1);
        assert_eq!(on_disk.entries["b"], 1);
    }

    #[tokio::test]
    async fn test_failure_record_write_error_keeps_item_queued() {
        let dir = TempDir::new().unwrap();
        let mut queue = RetryQueue::new(
            dir.path().join("queue"),
            1,
            FailureLog::new(dir.path().join("missing").join("fails")),
        );
        let action = Arc::new(ScriptedAction::new());
        action.fail_always("a");
        queue.enqueue("a");

        let summary = queue.retry_all(&dispatcher(&action)).await;

        assert_eq!(summary.escalated, 0);
        assert_eq!(queue.cycles("a"), Some(1));
    }

    #[tokio::test]
    async fn test_item_in_queue_or_failures_never_both() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        for key in ["a", "b", "c"] {
            action.fail_always(key);
            queue.enqueue(key);
        }
        action.recover("b");
        let d = dispatcher(&action);

        for _ in 0..BUDGET + 1 {
            queue.retry_all(&d).await;
            let failed = fails(&dir);
            for key in ["a", "b", "c"] {
                assert!(!(queue.contains(key) && failed.contains(&key.to_string())));
            }
        }

        assert!(queue.is_empty());
        assert_eq!(fails(&dir), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_pass_without_touching_counts() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        action.fail_always("a");
        queue.enqueue("a");
        queue.enqueue("b");
        let shutdown = CancellationToken::new();
        let d = Dispatcher::new(action.clone(), 3, Duration::from_secs(3600), shutdown.clone());

        shutdown.cancel();
        let summary = queue.retry_all(&d).await;

        assert!(summary.interrupted);
        assert_eq!(queue.cycles("a"), Some(0));
        assert_eq!(queue.cycles("b"), Some(0));
        assert_eq!(action.calls("b"), 0);
    }

    #[tokio::test]
    async fn test_failed_save_is_retried_when_queue_empties() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        let action = Arc::new(ScriptedAction::new());
        queue.enqueue("a");
        queue.persist().await.unwrap();
        assert!(!queue.is_dirty());

        std::fs::create_dir(statefile::temp_path(queue.path())).unwrap();
        let summary = queue.retry_all(&dispatcher(&action)).await;
        assert!(summary.save_failed);
        assert!(queue.is_empty());
        assert!(queue.is_dirty());

        std::fs::remove_dir(statefile::temp_path(queue.path())).unwrap();
        let summary = queue.retry_all(&dispatcher(&action)).await;

        assert!(!summary.save_failed);
        assert!(!queue.is_dirty());
        let on_disk = statefile::load(queue.path()).await.unwrap();
        assert!(on_disk.entries.is_empty());
    }

    #[tokio::test]
    async fn test_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut queue = queue_in(&dir);
        queue.enqueue("https://x/1.torrent");
        queue.enqueue("https://x/2.torrent");
        queue.items.insert("https://x/2.torrent".to_string(), 2);
        queue.persist().await.unwrap();

        let loaded = RetryQueue::load(
            dir.path().join("queue"),
            BUDGET,
            FailureLog::new(dir.path().join("fails")),
        )
        .await
        .unwrap();

        assert_eq!(
            loaded.items().collect::<Vec<_>>(),
            vec![("https://x/1.torrent", 0), ("https://x/2.torrent", 2)]
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let queue = RetryQueue::load(
            dir.path().join("queue"),
            BUDGET,
            FailureLog::new(dir.path().join("fails")),
        )
        .await
        .unwrap();
        assert!(queue.is_empty());
    }
}
