//! Signal handling for reload and graceful shutdown.
//!
//! Signals are translated into [`ControlEvent`]s on a dedicated task. The
//! listener never touches daemon state: it only sends events and, for a
//! terminate request, cancels the shared shutdown token so an in-flight
//! backoff sleep can return early.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A request delivered to the daemon loop from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Re-read the feeds file (SIGHUP).
    Reload,
    /// Persist state and exit (SIGTERM, SIGINT, SIGQUIT).
    Terminate,
}

/// Sending half of the control channel plus the shutdown token.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: UnboundedSender<ControlEvent>,
    shutdown: CancellationToken,
}

impl ControlHandle {
    /// Create a handle together with the receiver the daemon drains.
    pub fn new(shutdown: CancellationToken) -> (Self, UnboundedReceiver<ControlEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender, shutdown }, receiver)
    }

    /// Ask the daemon to reload its feed list.
    pub fn reload(&self) {
        let _ = self.sender.send(ControlEvent::Reload);
    }

    /// Ask the daemon to stop. Cancels the shutdown token first so blocking
    /// retries notice immediately.
    pub fn terminate(&self) {
        self.shutdown.cancel();
        let _ = self.sender.send(ControlEvent::Terminate);
    }

    /// Token cancelled by [`terminate`](Self::terminate).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Spawn the signal listener and return the event receiver.
///
/// SIGHUP maps to [`ControlEvent::Reload`]; SIGTERM, SIGINT and SIGQUIT map
/// to [`ControlEvent::Terminate`].
#[cfg(unix)]
pub fn spawn_signal_listener(
    shutdown: CancellationToken,
) -> std::io::Result<UnboundedReceiver<ControlEvent>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let (handle, receiver) = ControlHandle::new(shutdown);

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sighup.recv() => {
                    info!(message = "Signal received.", signal = "SIGHUP");
                    handle.reload();
                    continue;
                }
                Some(()) = sigint.recv() => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigquit.recv() => "SIGQUIT",
                else => {
                    error!("Signal streams closed, listener exiting");
                    return;
                }
            };
            info!(message = "Signal received.", signal = name);
            handle.terminate();
        }
    });

    Ok(receiver)
}
