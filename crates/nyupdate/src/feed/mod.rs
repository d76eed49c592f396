//! Feed fetching.
//!
//! The daemon only needs `(link, title)` pairs from a feed, so sources sit
//! behind the [`FeedSource`] trait. [`HttpFeedSource`] is the production
//! implementation; tests use in-memory fakes.

mod http;
mod item;

pub use http::{HttpFeedSource, parse_entries};
pub use item::{FeedItem, ItemPattern};

use async_trait::async_trait;

use crate::error::FetchError;

/// One entry as delivered by a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Dispatch target; embeds the numeric item id.
    pub link: String,
    pub title: String,
}

impl FeedEntry {
    pub fn new(link: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
        }
    }
}

/// A source of feed entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current entries of `url`.
    ///
    /// An unreachable or unparsable feed is an error; the caller skips the
    /// feed for this cycle.
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError>;
}
