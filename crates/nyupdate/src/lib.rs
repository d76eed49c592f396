//! nyupdate: feed-driven download daemon.
//!
//! Polls RSS/Atom feeds, hands every new item to an external add command
//! and keeps enough durable state to never lose or repeat an item:
//!
//! - a per-feed watermark of the highest item id handled
//! - a retry queue for items the add command rejected
//! - an append-only failure record for items that kept failing

pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod queue;
pub mod tracker;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use snafu::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::info;

// Re-export commonly used items
pub use config::Config;
pub use daemon::Daemon;
pub use dispatch::{AddAction, CommandAction, DispatchOutcome, Dispatcher};
pub use error::{AddError, DaemonError, FetchError};
pub use feed::{FeedEntry, FeedSource, HttpFeedSource};
pub use queue::{FailureLog, RetryQueue};
pub use tracker::{FeedTracker, PollOutcome};

pub use nyupdate_core::{CliArgs, ControlEvent, ControlHandle, init_tracing};

use crate::error::{HttpClientSnafu, InvalidCommandSnafu, MetricsSnafu, SignalsSnafu};

/// Start the daemon with the production collaborators and run it.
///
/// With `once`, a single cycle runs and the function returns; otherwise it
/// returns after a terminate signal has been handled.
pub async fn run(config: Config, once: bool) -> Result<(), DaemonError> {
    if let Some(address) = &config.metrics.address {
        nyupdate_core::metrics::init_global(address).context(MetricsSnafu)?;
        info!(address = %address, "Metrics endpoint enabled");
    }

    let shutdown = CancellationToken::new();
    let events = control_events(shutdown.clone())?;

    let source = HttpFeedSource::new(config.feed.timeout()).context(HttpClientSnafu)?;
    let action = CommandAction::from_command_line(&config.dispatch.command)
        .context(InvalidCommandSnafu)?;

    let daemon = Daemon::start(
        &config,
        Arc::new(source),
        Arc::new(action),
        shutdown,
        events,
    )
    .await?;

    if once {
        daemon.run_once().await
    } else {
        daemon.run().await
    }
}

#[cfg(unix)]
fn control_events(
    shutdown: CancellationToken,
) -> Result<UnboundedReceiver<ControlEvent>, DaemonError> {
    nyupdate_core::spawn_signal_listener(shutdown).context(SignalsSnafu)
}

#[cfg(not(unix))]
fn control_events(
    shutdown: CancellationToken,
) -> Result<UnboundedReceiver<ControlEvent>, DaemonError> {
    let (handle, events) = ControlHandle::new(shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.terminate();
        }
    });
    Ok(events)
}
