//! Configuration for the nyupdate daemon.
//!
//! Every field has a default, so the daemon runs without a config file.
//! A YAML file can override any of them:
//!
//! ```yaml
//! state_dir: ${HOME}/.nyupdate
//! update_interval_secs: 600
//! dispatch:
//!   command: [transmission-remote, --add]
//!   retry_attempts: 5
//!   retry_interval_secs: 5
//! queue:
//!   cycle_budget: 5
//! feed:
//!   item_pattern: '.+?(\d+)\.torrent'
//!   timeout_secs: 30
//! metrics:
//!   address: 127.0.0.1:9464
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::ConfigError;
use nyupdate_core::CliArgs;
use nyupdate_core::config::interpolate;
use nyupdate_core::error::{
    EnvInterpolationSnafu, InvalidPatternSnafu, InvalidSettingSnafu, NoStateDirSnafu,
    ReadFileSnafu, YamlParseSnafu,
};

/// File names inside the state directory.
pub const FEEDS_FILE: &str = "feeds";
pub const QUEUE_FILE: &str = "queue";
pub const FAILS_FILE: &str = "fails";

/// Directory under `$HOME` used when no state directory is configured.
pub const DEFAULT_STATE_DIR_NAME: &str = ".nyupdate";

/// Configuration of the external add-action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Program and leading arguments; the item key is appended.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Invocations per item before it is handed to the retry queue.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between two invocations for the same item.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            retry_attempts: default_retry_attempts(),
            retry_interval_secs: default_retry_interval(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

fn default_command() -> Vec<String> {
    vec!["transmission-remote".to_string(), "--add".to_string()]
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_interval() -> u64 {
    5
}

/// Configuration of the durable retry queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Failed retry passes before an item goes to the failure record.
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cycle_budget: default_cycle_budget(),
        }
    }
}

fn default_cycle_budget() -> u32 {
    5
}

/// Configuration of feed fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Regex whose first capture group is the numeric item id in a link.
    #[serde(default = "default_item_pattern")]
    pub item_pattern: String,
    /// HTTP timeout for one feed request.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            item_pattern: default_item_pattern(),
            timeout_secs: default_timeout(),
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Compile the item pattern.
    pub fn compile_pattern(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.item_pattern).context(InvalidPatternSnafu {
            pattern: &self.item_pattern,
        })
    }
}

fn default_item_pattern() -> String {
    r".+?(\d+)\.torrent".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address for `/metrics` and `/health`. Disabled when unset.
    #[serde(default)]
    pub address: Option<String>,
}

/// Main configuration for nyupdate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding `feeds`, `queue` and `fails`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Pause between two cycles.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_update_interval() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: None,
            update_interval_secs: default_update_interval(),
            dispatch: DispatchConfig::default(),
            queue: QueueConfig::default(),
            feed: FeedConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Build the configuration from CLI arguments.
    ///
    /// Reads the config file when one is given, then applies CLI overrides.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(state_dir) = &args.state_dir {
            config.state_dir = Some(state_dir.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return EnvInterpolationSnafu {
                message: result.errors.join("\n"),
            }
            .fail();
        }

        // An empty file means "all defaults".
        if result.text.trim().is_empty() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_secs == 0 {
            return invalid("update_interval_secs", "must be at least 1");
        }
        if self.dispatch.command.is_empty() || self.dispatch.command[0].is_empty() {
            return invalid("dispatch.command", "must name a program");
        }
        if self.dispatch.retry_attempts == 0 {
            return invalid("dispatch.retry_attempts", "must be at least 1");
        }
        if self.queue.cycle_budget == 0 {
            return invalid("queue.cycle_budget", "must be at least 1");
        }
        let pattern = self.feed.compile_pattern()?;
        if pattern.captures_len() < 2 {
            return invalid(
                "feed.item_pattern",
                "needs a capture group around the numeric id",
            );
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Resolve the state file locations.
    ///
    /// Falls back to `$HOME/.nyupdate` when no directory is configured.
    pub fn state_paths(&self) -> Result<StatePaths, ConfigError> {
        let dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => {
                let home = std::env::var_os("HOME").context(NoStateDirSnafu)?;
                PathBuf::from(home).join(DEFAULT_STATE_DIR_NAME)
            }
        };
        Ok(StatePaths::in_dir(dir))
    }
}

fn invalid(field: &str, message: &str) -> Result<(), ConfigError> {
    InvalidSettingSnafu { field, message }.fail()
}

/// Locations of the three state files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub dir: PathBuf,
    /// `feedURL @ lastSeenID` lines.
    pub feeds: PathBuf,
    /// `itemKey @ cycleCount` lines.
    pub queue: PathBuf,
    /// Append-only failure record.
    pub fails: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            feeds: dir.join(FEEDS_FILE),
            queue: dir.join(QUEUE_FILE),
            fails: dir.join(FAILS_FILE),
            dir,
        }
    }
}
