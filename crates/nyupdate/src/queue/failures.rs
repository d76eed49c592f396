//! Permanent failure record.
//!
//! Items land here once the retry queue gives up on them. The file is only
//! ever appended to and is meant for a human, the daemon never reads it.

use std::path::{Path, PathBuf};

use nyupdate_core::StateFileError;
use nyupdate_core::statefile::append_line;

/// Append-only log of item keys that need manual attention.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably record `item_key`.
    pub async fn record(&self, item_key: &str) -> Result<(), StateFileError> {
        append_line(&self.path, item_key).await
    }
}
