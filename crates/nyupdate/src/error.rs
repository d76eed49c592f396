//! Error types for the nyupdate daemon.

use snafu::prelude::*;

// Re-export common errors
pub use nyupdate_core::error::{ConfigError, MetricsError, StateFileError};

/// Errors from fetching or parsing a feed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The HTTP request failed (DNS, connect, timeout, body).
    #[snafu(display("Request to {url} failed: {source}"))]
    Request { url: String, source: reqwest::Error },

    /// The server answered with a non-success status.
    #[snafu(display("{url} returned HTTP {status}"))]
    Status { url: String, status: u16 },

    /// The body is not a valid RSS/Atom document.
    #[snafu(display("{url} is not a valid feed: {source}"))]
    Parse {
        url: String,
        source: feed_rs::parser::ParseFeedError,
    },
}

/// Errors from a single invocation of the add-action.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AddError {
    /// The dispatch command could not be started.
    #[snafu(display("Failed to run '{program}': {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The dispatch command exited unsuccessfully.
    #[snafu(display("'{program}' exited with {}", describe_exit(*code)))]
    ExitStatus { program: String, code: Option<i32> },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Fatal daemon errors. Everything else is logged and contained.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DaemonError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// A required state file could not be loaded at startup.
    #[snafu(display("Cannot load state: {source}"))]
    StateLoad { source: StateFileError },

    /// The state directory could not be created.
    #[snafu(display("Cannot create state directory {}: {source}", path.display()))]
    StateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Signal handlers could not be installed.
    #[snafu(display("Failed to install signal handlers: {source}"))]
    Signals { source: std::io::Error },

    /// Metrics setup failed.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// The dispatch command is empty.
    #[snafu(display("No dispatch command configured"))]
    InvalidCommand,

    /// The HTTP client could not be built.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },
}
