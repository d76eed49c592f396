//! Dispatch of items to the download client.
//!
//! [`Dispatcher::send`] wraps an [`AddAction`] in bounded immediate retry:
//! up to `attempts` invocations, `interval` apart, stopping at the first
//! success. The caller waits for the whole sequence, so two items are never
//! dispatched concurrently.

mod command;

pub use command::CommandAction;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nyupdate_core::emit;
use nyupdate_core::metrics::events::DispatchAttemptFailed;

use crate::error::AddError;

/// The external add-action, invoked once per attempt.
#[async_trait]
pub trait AddAction: Send + Sync {
    /// Hand `item_key` to the download client.
    async fn add(&self, item_key: &str) -> Result<(), AddError>;
}

/// Result of [`Dispatcher::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The add-action succeeded.
    Added,
    /// Every attempt failed.
    Failed,
    /// Shutdown was requested during the backoff after a failed attempt.
    Interrupted,
}

/// Bounded immediate retry around an [`AddAction`].
#[derive(Clone)]
pub struct Dispatcher {
    action: Arc<dyn AddAction>,
    attempts: u32,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// # Arguments
    /// * `attempts` - invocations per item, at least one is always made
    /// * `interval` - pause between two invocations
    /// * `shutdown` - cancels the pause early on terminate
    pub fn new(
        action: Arc<dyn AddAction>,
        attempts: u32,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            action,
            attempts: attempts.max(1),
            interval,
            shutdown,
        }
    }

    /// Configured number of attempts per item.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a terminate request has been observed.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Dispatch one item with bounded retry.
    pub async fn send(&self, item_key: &str) -> DispatchOutcome {
        for attempt in 1..=self.attempts {
            match self.action.add(item_key).await {
                Ok(()) => {
                    debug!(item = item_key, attempt, "Dispatched item");
                    return DispatchOutcome::Added;
                }
                Err(e) => {
                    emit!(DispatchAttemptFailed);
                    debug!(item = item_key, attempt, error = %e, "Dispatch attempt failed");
                }
            }

            if attempt == self.attempts {
                break;
            }

            warn!(
                item = item_key,
                "Failed to queue torrent, retrying in {} seconds.",
                self.interval.as_secs()
            );
            if self
                .shutdown
                .run_until_cancelled(tokio::time::sleep(self.interval))
                .await
                .is_none()
            {
                debug!(item = item_key, attempt, "Shutdown requested during dispatch backoff");
                return DispatchOutcome::Interrupted;
            }
        }

        DispatchOutcome::Failed
    }
}
