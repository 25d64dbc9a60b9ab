use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::{Entry, Feed};

/// App response of a feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub id: i32,
    pub url: String,
}

impl From<Feed> for FeedView {
    fn from(feed: Feed) -> Self {
        Self {
            id: feed.id,
            url: feed.url,
        }
    }
}

/// App response of an entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub id: i32,
    pub original_id: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: NaiveDateTime,
    pub status: String,
    pub feed_id: i32,
}

impl From<Entry> for EntryView {
    fn from(entry: Entry) -> Self {
        Self {
            id: entry.id,
            original_id: entry.original_id,
            title: entry.title,
            summary: entry.summary,
            link: entry.link,
            published_at: entry.published_at,
            status: entry.status,
            feed_id: entry.feed_id,
        }
    }
}
