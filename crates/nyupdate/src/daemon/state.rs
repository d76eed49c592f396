//! Feed watermarks backed by the feeds file.
//!
//! The feeds file is owned by the operator as much as by the daemon: feeds
//! are added and removed by hand while it runs. Every reload and every save
//! therefore merges the in-memory map with the file:
//!
//! - feeds in both keep the in-memory watermark
//! - feeds only in the file are added with the file value
//! - feeds missing from the file are dropped

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use nyupdate_core::emit;
use nyupdate_core::metrics::events::WatermarkRecorded;
use nyupdate_core::statefile;
use nyupdate_core::StateFileError;

/// Changes applied by a merge with the feeds file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl MergeSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Last seen item id per feed URL, in feeds file order.
#[derive(Debug)]
pub struct FeedWatermarks {
    path: PathBuf,
    feeds: IndexMap<String, u64>,
}

impl FeedWatermarks {
    /// Load the feeds file. The file must exist.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StateFileError> {
        let path = path.into();
        let state = statefile::load(&path).await?;
        info!(file = %path.display(), feeds = state.entries.len(), "Loaded feeds");
        Ok(Self {
            path,
            feeds: state.entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<u64> {
        self.feeds.get(url).copied()
    }

    /// Feed URLs in file order.
    pub fn urls(&self) -> Vec<String> {
        self.feeds.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.feeds.iter().map(|(url, id)| (url.as_str(), *id))
    }

    /// Raise the watermark of `url` to `watermark`.
    ///
    /// Watermarks never move backwards here, and feeds dropped by a reload
    /// are not resurrected.
    pub fn record(&mut self, url: &str, watermark: u64) {
        let Some(current) = self.feeds.get_mut(url) else {
            debug!(feed = url, "Feed no longer tracked, ignoring watermark");
            return;
        };
        if watermark > *current {
            *current = watermark;
            emit!(WatermarkRecorded {
                feed: url.to_string(),
                value: watermark,
            });
        }
    }

    /// Merge the entries of the feeds file into the map.
    pub fn merge(&mut self, from_file: IndexMap<String, u64>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut merged = IndexMap::with_capacity(from_file.len());

        for (url, file_value) in from_file {
            let value = match self.feeds.get(&url) {
                Some(current) => *current,
                None => {
                    summary.added.push(url.clone());
                    file_value
                }
            };
            merged.insert(url, value);
        }

        summary.removed = self
            .feeds
            .keys()
            .filter(|url| !merged.contains_key(*url))
            .cloned()
            .collect();

        self.feeds = merged;
        summary
    }

    /// Re-read the feeds file and merge it.
    ///
    /// On error the map is left as it was.
    pub async fn reload(&mut self) -> Result<MergeSummary, StateFileError> {
        let state = statefile::load(&self.path).await?;
        let summary = self.merge(state.entries);
        for url in &summary.added {
            info!(feed = %url, "Now tracking feed");
        }
        for url in &summary.removed {
            info!(feed = %url, "No longer tracking feed");
        }
        Ok(summary)
    }

    /// Reconcile with the feeds file, then atomically rewrite it.
    ///
    /// If the file cannot be read for the merge, the in-memory map is
    /// written as is.
    pub async fn persist(&mut self) -> Result<(), StateFileError> {
        match self.reload().await {
            Ok(summary) if !summary.is_empty() => {
                debug!(
                    added = summary.added.len(),
                    removed = summary.removed.len(),
                    "Picked up feeds file edits before saving"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "Cannot read feeds file, saving tracked feeds only");
            }
        }

        statefile::save(&self.path, self.iter(), true).await
    }
}
