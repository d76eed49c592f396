//! Common error types shared by the core crate and the daemon.
//!
//! This module defines error types for state files, configuration and metrics.

use std::path::PathBuf;

use snafu::prelude::*;

// ============ State File Errors ============

/// Errors that can occur while reading or writing a state file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StateFileError {
    /// The state file could not be opened for reading.
    #[snafu(display("Failed to open state file {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The state file was opened but could not be read.
    #[snafu(display("Failed to read state file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing the temporary sibling file failed.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Flushing file contents or a directory entry to disk failed.
    #[snafu(display("Failed to sync {}: {source}", path.display()))]
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Renaming the temporary file over the target failed.
    #[snafu(display("Failed to rename {} to {}: {source}", from.display(), to.display()))]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl StateFileError {
    /// Check if this error means the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StateFileError::Open { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// The item id pattern is not a valid regular expression.
    #[snafu(display("Invalid item pattern '{pattern}': {source}"))]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A setting has a value the daemon cannot run with.
    #[snafu(display("Invalid setting '{field}': {message}"))]
    InvalidSetting { field: String, message: String },

    /// No state directory was configured and `$HOME` is not set.
    #[snafu(display("No state directory configured and HOME is not set"))]
    NoStateDir,
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics address could not be parsed.
    #[snafu(display("Invalid metrics address '{address}': {source}"))]
    InvalidAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Metrics were already initialized.
    #[snafu(display("Metrics already initialized"))]
    AlreadyInitialized,

    /// Metrics have not been initialized.
    #[snafu(display("Metrics not initialized"))]
    NotInitialized,
}
