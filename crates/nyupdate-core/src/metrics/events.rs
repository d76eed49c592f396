//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the daemon.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.
//!
//! ## Feed Labels
//!
//! Per-feed metrics carry a `feed` label holding the feed URL, so a single
//! unreachable feed stands out in dashboards.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Status of a request against a collaborator or the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted after every feed fetch.
pub struct FeedPolled {
    pub feed: String,
    pub status: RequestStatus,
}

impl InternalEvent for FeedPolled {
    fn emit(self) {
        trace!(feed = %self.feed, status = self.status.as_str(), "Feed polled");
        counter!("nyupdate_feed_polls_total", "feed" => self.feed, "status" => self.status.as_str())
            .increment(1);
    }
}

/// Event emitted with the number of entries newer than the watermark.
pub struct ItemsDiscovered {
    pub feed: String,
    pub count: u64,
}

impl InternalEvent for ItemsDiscovered {
    fn emit(self) {
        trace!(feed = %self.feed, count = self.count, "Items discovered");
        counter!("nyupdate_items_discovered_total", "feed" => self.feed).increment(self.count);
    }
}

/// Event emitted when a feed watermark is recorded.
pub struct WatermarkRecorded {
    pub feed: String,
    pub value: u64,
}

impl InternalEvent for WatermarkRecorded {
    fn emit(self) {
        trace!(feed = %self.feed, value = self.value, "Watermark recorded");
        gauge!("nyupdate_feed_watermark", "feed" => self.feed).set(self.value as f64);
    }
}

/// Where a dispatched item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOrigin {
    /// Freshly discovered in a feed.
    Feed,
    /// Re-attempted from the retry queue.
    Queue,
}

impl DispatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOrigin::Feed => "feed",
            DispatchOrigin::Queue => "queue",
        }
    }
}

/// Event emitted when an item is handed to the download client successfully.
pub struct ItemDispatched {
    pub origin: DispatchOrigin,
}

impl InternalEvent for ItemDispatched {
    fn emit(self) {
        trace!(origin = self.origin.as_str(), "Item dispatched");
        counter!("nyupdate_items_dispatched_total", "origin" => self.origin.as_str()).increment(1);
    }
}

/// Event emitted for every failed invocation of the add-action.
pub struct DispatchAttemptFailed;

impl InternalEvent for DispatchAttemptFailed {
    fn emit(self) {
        trace!("Dispatch attempt failed");
        counter!("nyupdate_dispatch_attempt_failures_total").increment(1);
    }
}

/// Event emitted when items are moved into the retry queue.
pub struct ItemsQueued {
    pub count: u64,
}

impl InternalEvent for ItemsQueued {
    fn emit(self) {
        trace!(count = self.count, "Items queued");
        counter!("nyupdate_items_queued_total").increment(self.count);
    }
}

/// Event emitted when a queued item is written to the failure record.
pub struct ItemEscalated;

impl InternalEvent for ItemEscalated {
    fn emit(self) {
        trace!("Item escalated to failure record");
        counter!("nyupdate_items_escalated_total").increment(1);
    }
}

/// Event emitted with the queue size after a retry pass.
pub struct QueueDepth {
    pub depth: usize,
}

impl InternalEvent for QueueDepth {
    fn emit(self) {
        trace!(depth = self.depth, "Queue depth");
        gauge!("nyupdate_queue_depth").set(self.depth as f64);
    }
}

/// Event emitted after every attempt to save a state file.
pub struct StateSaved {
    /// File name, e.g. `feeds` or `queue`.
    pub file: String,
    pub status: RequestStatus,
}

impl InternalEvent for StateSaved {
    fn emit(self) {
        trace!(file = %self.file, status = self.status.as_str(), "State saved");
        counter!("nyupdate_state_saves_total", "file" => self.file, "status" => self.status.as_str())
            .increment(1);
    }
}

/// Event emitted at the end of every cycle.
pub struct CycleCompleted {
    pub duration: Duration,
}

impl InternalEvent for CycleCompleted {
    fn emit(self) {
        trace!(duration_secs = self.duration.as_secs_f64(), "Cycle completed");
        counter!("nyupdate_cycles_total").increment(1);
        histogram!("nyupdate_cycle_duration_seconds").record(self.duration.as_secs_f64());
    }
}
