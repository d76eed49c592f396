//! Item identifiers embedded in feed links.

use regex::Regex;

use super::FeedEntry;

/// Extracts the numeric item id from a link.
///
/// The first capture group of the pattern must match the digits, e.g.
/// `.+?(\d+)\.torrent` turns `https://nyaa.example/download/1234.torrent`
/// into `1234`.
#[derive(Debug, Clone)]
pub struct ItemPattern {
    regex: Regex,
}

impl ItemPattern {
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }

    /// The id embedded in `link`, if the pattern matches.
    pub fn extract(&self, link: &str) -> Option<u64> {
        self.regex
            .captures(link)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// A feed entry with its id resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub id: u64,
    /// Item key handed to the add-action and stored in the queue.
    pub link: String,
    pub title: String,
}

impl FeedItem {
    pub fn from_entry(entry: FeedEntry, pattern: &ItemPattern) -> Result<Self, FeedEntry> {
        match pattern.extract(&entry.link) {
            Some(id) => Ok(Self {
                id,
                link: entry.link,
                title: entry.title,
            }),
            None => Err(entry),
        }
    }
}
