//! The daemon loop.
//!
//! One task owns all state and runs cycles back to back:
//!
//! 1. Poll every feed in file order, dispatching new items
//! 2. Persist the retry queue if it changed or an earlier save failed
//! 3. Re-attempt everything in the retry queue
//! 4. Persist the watermarks
//! 5. Sleep until the next cycle
//!
//! Reload and terminate requests arrive as [`ControlEvent`]s and are only
//! acted on between cycles or during the sleep. A terminate request also
//! cancels the shutdown token so a dispatch backoff ends early.

mod state;

pub use state::{FeedWatermarks, MergeSummary};

use std::sync::Arc;
use std::time::Duration;

use snafu::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use nyupdate_core::ControlEvent;
use nyupdate_core::emit;
use nyupdate_core::metrics::events::CycleCompleted;

use crate::config::{Config, StatePaths};
use crate::dispatch::{AddAction, Dispatcher};
use crate::error::{ConfigSnafu, DaemonError, StateDirSnafu, StateLoadSnafu};
use crate::feed::{FeedSource, ItemPattern};
use crate::queue::{FailureLog, RetryQueue};
use crate::tracker::FeedTracker;

/// Why the interval sleep ended.
enum Wake {
    Deadline,
    Reload,
    Terminate,
    ChannelClosed,
}

/// Daemon state and collaborators.
pub struct Daemon {
    paths: StatePaths,
    update_interval: Duration,
    feeds: FeedWatermarks,
    queue: RetryQueue,
    tracker: FeedTracker,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    events: UnboundedReceiver<ControlEvent>,
    events_open: bool,
}

impl Daemon {
    /// Load state and build the daemon.
    ///
    /// The feeds file must exist. A missing queue file is an empty queue;
    /// any other problem reading either file is fatal.
    pub async fn start(
        config: &Config,
        source: Arc<dyn FeedSource>,
        action: Arc<dyn AddAction>,
        shutdown: CancellationToken,
        events: UnboundedReceiver<ControlEvent>,
    ) -> Result<Self, DaemonError> {
        let paths = config.state_paths().context(ConfigSnafu)?;
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .context(StateDirSnafu { path: &paths.dir })?;

        let feeds = FeedWatermarks::load(&paths.feeds)
            .await
            .context(StateLoadSnafu)?;
        let queue = RetryQueue::load(
            &paths.queue,
            config.queue.cycle_budget,
            FailureLog::new(&paths.fails),
        )
        .await
        .context(StateLoadSnafu)?;

        let pattern = ItemPattern::new(config.feed.compile_pattern().context(ConfigSnafu)?);
        let dispatcher = Dispatcher::new(
            action,
            config.dispatch.retry_attempts,
            config.dispatch.retry_interval(),
            shutdown.clone(),
        );

        info!(
            state_dir = %paths.dir.display(),
            feeds = feeds.len(),
            queued = queue.len(),
            "Program has started."
        );

        Ok(Self {
            paths,
            update_interval: config.update_interval(),
            feeds,
            queue,
            tracker: FeedTracker::new(source, pattern),
            dispatcher,
            shutdown,
            events,
            events_open: true,
        })
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn feeds(&self) -> &FeedWatermarks {
        &self.feeds
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Run cycles until terminate, then persist state.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        loop {
            if !self.drain_events().await {
                break;
            }

            self.run_cycle().await;
            if self.shutdown.is_cancelled() {
                break;
            }

            info!(
                "Checking again in {:.2} minutes.",
                self.update_interval.as_secs_f64() / 60.0
            );
            if !self.sleep_until(Instant::now() + self.update_interval).await {
                break;
            }
        }

        self.terminate().await;
        Ok(())
    }

    /// Run a single cycle and return.
    pub async fn run_once(mut self) -> Result<(), DaemonError> {
        self.run_cycle().await;
        info!("Single cycle finished.");
        Ok(())
    }

    /// One full cycle: poll, retry, persist.
    pub async fn run_cycle(&mut self) {
        let started = Instant::now();
        info!("Checking feeds now...");

        for url in self.feeds.urls() {
            if self.shutdown.is_cancelled() {
                debug!("Shutdown requested, skipping remaining feeds");
                break;
            }
            let last_seen = self.feeds.get(&url).unwrap_or(0);
            let outcome = self
                .tracker
                .poll(&url, last_seen, &self.dispatcher, &mut self.queue)
                .await;
            self.feeds.record(&url, outcome.watermark);
        }

        if self.queue.is_dirty()
            && let Err(e) = self.queue.persist().await
        {
            error!(error = %e, "Failed to persist retry queue");
        }

        let summary = self.queue.retry_all(&self.dispatcher).await;
        debug!(
            added = summary.added,
            requeued = summary.requeued,
            escalated = summary.escalated,
            "Retry pass finished"
        );

        if summary.save_failed {
            // Moving watermarks past items that are only queued in memory
            // would lose them on a crash.
            error!("Retry queue not saved, keeping previous watermarks on disk");
        } else {
            self.persist_feeds().await;
        }

        emit!(CycleCompleted {
            duration: started.elapsed(),
        });
    }

    /// Re-read the feeds file.
    pub async fn reload(&mut self) {
        match self.feeds.reload().await {
            Ok(_) => info!("Reloaded feed information"),
            Err(e) => error!(
                error = %e,
                file = %self.feeds.path().display(),
                "Failed to reload feed information, keeping current feeds"
            ),
        }
    }

    /// Persist queue and watermarks before exit.
    async fn terminate(&mut self) {
        info!("Program is stopping now.");
        match self.queue.persist().await {
            Ok(()) => self.persist_feeds().await,
            Err(e) => error!(error = %e, "Failed to persist retry queue, keeping previous watermarks on disk"),
        }
        info!("Program has successfully terminated!");
    }

    async fn persist_feeds(&mut self) {
        if let Err(e) = self.feeds.persist().await {
            error!(
                error = %e,
                file = %self.feeds.path().display(),
                "Failed to persist feed watermarks"
            );
        }
    }

    /// Handle queued control events. Returns false on terminate.
    async fn drain_events(&mut self) -> bool {
        while self.events_open {
            match self.events.try_recv() {
                Ok(ControlEvent::Reload) => self.reload().await,
                Ok(ControlEvent::Terminate) => {
                    self.shutdown.cancel();
                    return false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.events_open = false,
            }
        }
        !self.shutdown.is_cancelled()
    }

    /// Sleep until `deadline`, serving reloads. Returns false on terminate.
    async fn sleep_until(&mut self, deadline: Instant) -> bool {
        loop {
            let wake = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => Wake::Terminate,

                event = self.events.recv(), if self.events_open => match event {
                    Some(ControlEvent::Reload) => Wake::Reload,
                    Some(ControlEvent::Terminate) => Wake::Terminate,
                    None => Wake::ChannelClosed,
                },

                _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
            };

            match wake {
                Wake::Deadline => return true,
                Wake::Reload => self.reload().await,
                Wake::Terminate => {
                    self.shutdown.cancel();
                    return false;
                }
                Wake::ChannelClosed => {
                    debug!("Control channel closed");
                    self.events_open = false;
                }
            }
        }
    }
}
