//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dispatch::AddAction;
use crate::error::{AddError, FetchError};
use crate::feed::{FeedEntry, FeedSource};

#[derive(Debug, Clone, Copy)]
enum Failures {
    Times(u32),
    Always,
}

/// Add-action whose failures are scripted per item key.
///
/// Keys without a script succeed.
#[derive(Default)]
pub struct ScriptedAction {
    failures: Mutex<HashMap<String, Failures>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` attempts for `key`, then succeed.
    pub fn fail_times(&self, key: &str, n: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), Failures::Times(n));
    }

    pub fn fail_always(&self, key: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), Failures::Always);
    }

    pub fn recover(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    /// Number of attempts made for `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    /// Every attempt in order.
    pub fn history(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddAction for ScriptedAction {
    async fn add(&self, item_key: &str) -> Result<(), AddError> {
        self.calls.lock().unwrap().push(item_key.to_string());

        let mut failures = self.failures.lock().unwrap();
        let fail = match failures.get_mut(item_key) {
            None => false,
            Some(Failures::Always) => true,
            Some(Failures::Times(0)) => false,
            Some(Failures::Times(n)) => {
                *n -= 1;
                true
            }
        };

        if fail {
            Err(AddError::ExitStatus {
                program: "scripted".to_string(),
                code: Some(1),
            })
        } else {
            Ok(())
        }
    }
}

/// Feed source serving fixed entries per URL. Unknown URLs are unreachable.
#[derive(Default)]
pub struct StaticFeeds {
    feeds: Mutex<HashMap<String, Vec<FeedEntry>>>,
}

impl StaticFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, entries: Vec<FeedEntry>) {
        self.feeds.lock().unwrap().insert(url.to_string(), entries);
    }
}

#[async_trait]
impl FeedSource for StaticFeeds {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
    }
}

/// Entry whose link carries `id` in the default pattern.
pub fn torrent(id: u64) -> FeedEntry {
    FeedEntry::new(torrent_link(id), format!("Episode {id}"))
}

pub fn torrent_link(id: u64) -> String {
    format!("https://nyaa.example/download/{id}.torrent")
}
