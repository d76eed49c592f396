//! Per-feed discovery of new items.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nyupdate_core::emit;
use nyupdate_core::metrics::events::{
    DispatchOrigin, FeedPolled, ItemDispatched, ItemsDiscovered, ItemsQueued, RequestStatus,
};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::feed::{FeedEntry, FeedItem, FeedSource, ItemPattern};
use crate::queue::RetryQueue;

/// Result of polling one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// New watermark for the feed. Equal to the input when nothing was new.
    pub watermark: u64,
    /// Item keys that went to the retry queue.
    pub queued: Vec<String>,
    /// Number of items the add-action accepted.
    pub dispatched: usize,
}

impl PollOutcome {
    fn unchanged(last_seen: u64) -> Self {
        Self {
            watermark: last_seen,
            ..Default::default()
        }
    }
}

/// Fetches a feed and dispatches every entry above its watermark.
pub struct FeedTracker {
    source: Arc<dyn FeedSource>,
    pattern: ItemPattern,
}

impl FeedTracker {
    pub fn new(source: Arc<dyn FeedSource>, pattern: ItemPattern) -> Self {
        Self { source, pattern }
    }

    /// Poll `feed_url` and process entries with an id above `last_seen`.
    ///
    /// Entries are handled in ascending id order. Items the dispatcher could
    /// not deliver are enqueued, so the returned watermark covers every id
    /// that was either dispatched or queued.
    pub async fn poll(
        &self,
        feed_url: &str,
        last_seen: u64,
        dispatcher: &Dispatcher,
        queue: &mut RetryQueue,
    ) -> PollOutcome {
        let entries = match self.source.fetch(feed_url).await {
            Ok(entries) => {
                emit!(FeedPolled {
                    feed: feed_url.to_string(),
                    status: RequestStatus::Success,
                });
                entries
            }
            Err(e) => {
                emit!(FeedPolled {
                    feed: feed_url.to_string(),
                    status: RequestStatus::Error,
                });
                warn!(feed = feed_url, error = %e, "RSS-Feed: {feed_url} is not reachable or invalid!");
                return PollOutcome::unchanged(last_seen);
            }
        };

        info!(feed = feed_url, "RSS-Feed: {feed_url} is now being processed!");

        let items = self.new_items(feed_url, entries, last_seen);
        emit!(ItemsDiscovered {
            feed: feed_url.to_string(),
            count: items.len() as u64,
        });

        let mut outcome = PollOutcome::unchanged(last_seen);
        for item in items {
            if dispatcher.is_shutdown() {
                debug!(feed = feed_url, "Shutdown requested, leaving remaining entries for the next run");
                break;
            }

            info!(feed = feed_url, id = item.id, "Adding {} to queue!", item.title);
            match dispatcher.send(&item.link).await {
                DispatchOutcome::Added => {
                    emit!(ItemDispatched {
                        origin: DispatchOrigin::Feed,
                    });
                    outcome.dispatched += 1;
                }
                DispatchOutcome::Failed => {
                    warn!(
                        feed = feed_url,
                        item = %item.link,
                        "Failed to queue torrent after {} tries, skipping.",
                        dispatcher.attempts()
                    );
                    if queue.enqueue(&item.link) {
                        outcome.queued.push(item.link.clone());
                    }
                }
                DispatchOutcome::Interrupted => {
                    warn!(
                        feed = feed_url,
                        item = %item.link,
                        "Dispatch interrupted by shutdown, torrent moved to retry queue."
                    );
                    if queue.enqueue(&item.link) {
                        outcome.queued.push(item.link.clone());
                    }
                }
            }
            outcome.watermark = outcome.watermark.max(item.id);
        }

        if !outcome.queued.is_empty() {
            emit!(ItemsQueued {
                count: outcome.queued.len() as u64,
            });
        }
        outcome
    }

    /// Resolve ids, drop entries at or below `last_seen`, sort ascending.
    fn new_items(
        &self,
        feed_url: &str,
        entries: Vec<FeedEntry>,
        last_seen: u64,
    ) -> Vec<FeedItem> {
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            match FeedItem::from_entry(entry, &self.pattern) {
                Ok(item) if item.id > last_seen => items.push(item),
                Ok(_) => {}
                Err(entry) => {
                    debug!(feed = feed_url, link = %entry.link, "Link does not carry an item id, skipping");
                }
            }
        }

        // Stable sort keeps the first entry of a duplicated id in front.
        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);
        items
    }
}
