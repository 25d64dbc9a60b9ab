use chrono::{DateTime, Utc};

/// The fields of one syndication item that FeedCloud cares about.
/// Published times are always UTC, whatever the feed's own offset was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub published: DateTime<Utc>,
}
