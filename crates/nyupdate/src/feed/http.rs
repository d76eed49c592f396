//! RSS/Atom over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use snafu::prelude::*;
use tracing::debug;

use super::{FeedEntry, FeedSource};
use crate::error::{FetchError, ParseSnafu, RequestSnafu, StatusSnafu};

const USER_AGENT: &str = concat!("nyupdate/", env!("CARGO_PKG_VERSION"));

/// Fetches feeds with `reqwest` and parses them with `feed-rs`.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(RequestSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu {
                url,
                status: status.as_u16(),
            }
            .fail();
        }

        let body = response.bytes().await.context(RequestSnafu { url })?;
        let entries = parse_entries(&body).context(ParseSnafu { url })?;

        debug!(feed = url, entries = entries.len(), "Fetched feed");
        Ok(entries)
    }
}

/// Parse a feed document into entries.
///
/// Entries without a link cannot be dispatched and are dropped.
pub fn parse_entries(body: &[u8]) -> Result<Vec<FeedEntry>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(body)?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.into_iter().next()?.href;
            let title = entry
                .title
                .map(|text| text.content)
                .unwrap_or_default();
            Some(FeedEntry { link, title })
        })
        .collect())
}
