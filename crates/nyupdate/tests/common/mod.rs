//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use nyupdate::{
    AddAction, AddError, Config, ControlHandle, Daemon, FeedEntry, FeedSource, FetchError,
};

pub const FEED: &str = "https://nyaa.example/?page=rss&q=show";

pub fn torrent(id: u64) -> FeedEntry {
    FeedEntry::new(torrent_link(id), format!("Episode {id}"))
}

pub fn torrent_link(id: u64) -> String {
    format!("https://nyaa.example/download/{id}.torrent")
}

/// Feed source with entries set per URL. Unknown URLs answer 503.
#[derive(Default)]
pub struct FakeFeeds {
    feeds: Mutex<HashMap<String, Vec<FeedEntry>>>,
}

impl FakeFeeds {
    pub fn set(&self, url: &str, entries: Vec<FeedEntry>) {
        self.feeds.lock().unwrap().insert(url.to_string(), entries);
    }
}

#[async_trait]
impl FeedSource for FakeFeeds {
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

/// Download client that rejects a configurable set of keys.
#[derive(Default)]
pub struct FakeClient {
    rejecting: Mutex<Vec<String>>,
    accepted: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn reject(&self, key: &str) {
        self.rejecting.lock().unwrap().push(key.to_string());
    }

    pub fn accept_all(&self) {
        self.rejecting.lock().unwrap().clear();
    }

    pub fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddAction for FakeClient {
    async fn add(&self, item_key: &str) -> Result<(), AddError> {
        self.attempts.lock().unwrap().push(item_key.to_string());
        if self.rejecting.lock().unwrap().iter().any(|k| k == item_key) {
            return Err(AddError::ExitStatus {
                program: "fake-client".to_string(),
                code: Some(1),
            });
        }
        self.accepted.lock().unwrap().push(item_key.to_string());
        Ok(())
    }
}

/// State directory plus fakes, able to start daemons over the same files.
pub struct TestEnv {
    pub dir: TempDir,
    pub feeds: Arc<FakeFeeds>,
    pub client: Arc<FakeClient>,
    pub config: Config,
}

impl TestEnv {
    pub fn new(feeds_file: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("feeds"), feeds_file).unwrap();

        let mut config = Config::default();
        config.state_dir = Some(dir.path().to_path_buf());
        config.update_interval_secs = 3600;
        config.dispatch.retry_attempts = 2;
        config.dispatch.retry_interval_secs = 0;
        config.queue.cycle_budget = 3;

        Self {
            dir,
            feeds: Arc::new(FakeFeeds::default()),
            client: Arc::new(FakeClient::default()),
            config,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap_or_default()
    }

    /// Start a daemon and return it with its control handle.
    pub async fn start(&self) -> (Daemon, ControlHandle) {
        let (control, events) = ControlHandle::new(CancellationToken::new());
        let daemon = Daemon::start(
            &self.config,
            self.feeds.clone(),
            self.client.clone(),
            control.shutdown_token(),
            events,
        )
        .await
        .unwrap();
        (daemon, control)
    }
}

/// `key @ value` entries of a state file, ignoring comments and blanks.
pub fn entries(path: &Path) -> Vec<(String, u64)> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .filter_map(|line| match nyupdate_core::parse_line(line) {
            nyupdate_core::Line::Entry { key, value } => Some((key, value)),
            _ => None,
        })
        .collect()
}
