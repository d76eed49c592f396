//! nyupdate-core: infrastructure for the nyupdate feed daemon.
//!
//! - `statefile` - `key @ value` state files with atomic saves
//! - `signal` - signal handling mapped to reload/terminate events
//! - `config` - CLI arguments and environment variable interpolation
//! - `metrics` - Prometheus metrics infrastructure
//! - `tracing` - subscriber initialization
//! - `error` - shared error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod statefile;
pub mod tracing;

pub use config::{CliArgs, interpolate};
pub use error::{ConfigError, MetricsError, StateFileError};
pub use signal::{ControlEvent, ControlHandle};
#[cfg(unix)]
pub use signal::spawn_signal_listener;
pub use statefile::{Line, StateFile, parse_line};
pub use crate::tracing::init_tracing;
