//! Thin client for syndication feeds: fetch a URL and decode its RSS or
//! Atom payload into [`RawEntry`] values. No FeedCloud semantics live here.

pub mod error;
pub mod result;


use chrono::Utc;

pub use error::{Error, Result};
pub use result::RawEntry;

#[derive(Debug, Clone, Default)]
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and parse a feed. Any malformed payload is a [`Error::ParseError`].
    pub async fn download_entries(&self, url: &str) -> Result<Vec<RawEntry>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_entries(&bytes)
    }
}

pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| Error::ParseError(e.to_string()))?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            // Some providers omit the guid; the link is the next most stable id.
            let id = if entry.id.is_empty() { link.clone() } else { entry.id };
            let published = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

            RawEntry {
                id,
                title,
                description,
                link,
                published,
            }
        })
        .collect();

    Ok(entries)
}
