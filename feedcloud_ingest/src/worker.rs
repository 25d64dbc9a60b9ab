use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;

use feed_client::{FeedClient, RawEntry};
use feedcloud_core::model::{Entry, Feed, FeedUpdateRun, NewEntry, NewFeedUpdateRun};
use feedcloud_core::{Database, Error, Result};

use crate::broker::{Broker, Task};

const MIN_BACKOFF_SECONDS: i64 = 5;
const BACKOFF_MULTIPLIER: i64 = 10;
const MAX_BACKOFF_SECONDS: i64 = 3600;

/// Fetches and parses one feed URL. The worker depends on nothing else of
/// the parser; tests substitute a deterministic fake.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> feed_client::error::Result<Vec<RawEntry>>;
}

#[async_trait]
impl Downloader for FeedClient {
    async fn download(&self, url: &str) -> feed_client::error::Result<Vec<RawEntry>> {
        self.download_entries(url).await
    }
}

/// Invoked once when a feed exhausts its retries.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, feed_id: i32);
}

#[async_trait]
impl FailureNotifier for Broker {
    async fn notify(&self, feed_id: i32) {
        if let Err(e) = self.send(Task::NotifyUserOnFailure { feed_id }).await {
            tracing::error!("Cannot enqueue failure notification for feed {}: {}", feed_id, e);
        }
    }
}

/// FeedWorker executes exactly one refresh attempt for one feed: download
/// the entries, save the new ones, and record a [`FeedUpdateRun`] describing
/// the outcome. Failed attempts schedule their own retry with exponential
/// backoff until the feed is terminally failed.
pub struct FeedWorker<'a> {
    feed: Feed,
    downloader: &'a dyn Downloader,
    failure_notifier: Option<&'a dyn FailureNotifier>,
    max_failure_count: i32,
}

impl<'a> FeedWorker<'a> {
    pub fn new(feed: Feed, downloader: &'a dyn Downloader, max_failure_count: i32) -> Self {
        Self {
            feed,
            downloader,
            failure_notifier: None,
            max_failure_count,
        }
    }

    pub fn with_failure_notifier(mut self, notifier: &'a dyn FailureNotifier) -> Self {
        self.failure_notifier = Some(notifier);
        self
    }

    pub async fn start(&self, db: Database<'_>) -> Result<()> {
        match self.downloader.download(&self.feed.url).await {
            Ok(entries) => self.save_entries(db, &entries),
            Err(e) => {
                tracing::warn!("Failed to read entries from feed {}: {}", self.feed.id, e);
                self.save_failure_run(db).await
            }
        }
    }

    /// Save all unseen entries plus a success run in one transaction.
    /// Entries already present count as ignored.
    fn save_entries(&self, db: Database<'_>, entries: &[RawEntry]) -> Result<()> {
        use feedcloud_core::schema::{entry, feed_update_run};

        let result = db.transaction(|conn| {
            let mut n_downloaded = 0;
            let mut n_ignored = 0;

            for raw in entries {
                if self.entry_exists(conn, &raw.id)? {
                    n_ignored += 1;
                    continue;
                }

                let new_entry = NewEntry {
                    original_id: raw.id.clone(),
                    title: raw.title.clone(),
                    summary: raw.description.clone(),
                    link: raw.link.clone(),
                    published_at: raw.published.naive_utc(),
                    status: Entry::UNREAD.to_string(),
                    feed_id: self.feed.id,
                };
                diesel::insert_into(entry::table).values(&new_entry).execute(conn)?;
                n_downloaded += 1;
            }

            let run = NewFeedUpdateRun {
                timestamp: Utc::now().naive_utc(),
                status: FeedUpdateRun::SUCCESS.to_string(),
                failure_count: 0,
                next_run_schedule: None,
                n_downloaded,
                n_ignored,
                feed_id: self.feed.id,
            };
            diesel::insert_into(feed_update_run::table).values(&run).execute(conn)?;

            tracing::info!(
                "Feed {} updated: {} new entries, {} ignored",
                self.feed.id,
                n_downloaded,
                n_ignored
            );
            Ok(())
        });

        match result {
            // A concurrent worker for the same feed committed first; the
            // unique index on (original_id, feed_id) rejected our copy.
            // Drop the whole attempt, the scheduler will pick the feed again.
            Err(Error::DatabaseError(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => {
                tracing::warn!(
                    "Entries for feed {} were saved concurrently, dropping this attempt",
                    self.feed.id
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Record a failed run, scheduling the next retry or latching the feed
    /// into terminal failure once the retries are exhausted.
    async fn save_failure_run(&self, db: Database<'_>) -> Result<()> {
        use feedcloud_core::schema::feed_update_run;

        let last_run = feed_update_run::table
            .filter(feed_update_run::feed_id.eq(self.feed.id))
            .order((feed_update_run::timestamp.desc(), feed_update_run::id.desc()))
            .first::<FeedUpdateRun>(db)
            .optional()?;

        let failure_count = match last_run {
            Some(run) if run.status == FeedUpdateRun::FAILED => run.failure_count + 1,
            _ => 1,
        };
        let next_run_schedule = calculate_next_run_time(failure_count, self.max_failure_count);

        // Notify before the run row is written: a terminal run must never
        // become durable without its notification having been sent.
        if next_run_schedule.is_none() {
            tracing::warn!(
                "Feed {} failed {} times in a row and will not be rescheduled",
                self.feed.id,
                failure_count
            );
            if let Some(notifier) = self.failure_notifier {
                notifier.notify(self.feed.id).await;
            }
        }

        let run = NewFeedUpdateRun {
            timestamp: Utc::now().naive_utc(),
            status: FeedUpdateRun::FAILED.to_string(),
            failure_count,
            next_run_schedule,
            n_downloaded: 0,
            n_ignored: 0,
            feed_id: self.feed.id,
        };
        diesel::insert_into(feed_update_run::table).values(&run).execute(db)?;
        Ok(())
    }

    fn entry_exists(&self, db: Database<'_>, original_id: &str) -> Result<bool> {
        use feedcloud_core::schema::entry;
        let count: i64 = entry::table
            .filter(entry::original_id.eq(original_id))
            .filter(entry::feed_id.eq(self.feed.id))
            .count()
            .get_result(db)?;
        Ok(count != 0)
    }
}

/// Exponential-backoff delay before the next attempt, or `None` once the
/// feed has exhausted its retries.
pub fn backoff_seconds(failure_count: i32, max_failure_count: i32) -> Option<i64> {
    if failure_count >= max_failure_count {
        return None;
    }
    let exponential = BACKOFF_MULTIPLIER.saturating_mul(2i64.saturating_pow(failure_count as u32));
    Some(MIN_BACKOFF_SECONDS.saturating_add(exponential).min(MAX_BACKOFF_SECONDS))
}

pub fn calculate_next_run_time(failure_count: i32, max_failure_count: i32) -> Option<NaiveDateTime> {
    backoff_seconds(failure_count, max_failure_count)
        .map(|seconds| Utc::now().naive_utc() + chrono::Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use feedcloud_core::schema::{entry, feed_update_run};

    use super::*;
    use crate::testing::{
        create_feed, create_user, raw_entry, setup_connection, FailingDownloader, FakeDownloader,
        RecordingNotifier,
    };

    fn load_runs(db: Database<'_>) -> Vec<FeedUpdateRun> {
        feed_update_run::table
            .order((feed_update_run::timestamp.asc(), feed_update_run::id.asc()))
            .load(db)
            .unwrap()
    }

    #[tokio::test]
    async fn test_worker_saves_entries() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://feed");

        let downloader = FakeDownloader::new(vec![raw_entry("entry-1")]);
        let worker = FeedWorker::new(feed.clone(), &downloader, 3);
        worker.start(db).await.unwrap();

        let entries: Vec<Entry> = entry::table.load(db).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_id, "entry-1");
        assert_eq!(entries[0].status, Entry::UNREAD);
        assert_eq!(entries[0].feed_id, feed.id);

        let runs = load_runs(db);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, FeedUpdateRun::SUCCESS);
        assert_eq!(runs[0].failure_count, 0);
        assert_eq!(runs[0].next_run_schedule, None);
        assert_eq!(runs[0].n_downloaded, 1);
        assert_eq!(runs[0].n_ignored, 0);
    }

    #[tokio::test]
    async fn test_worker_stores_published_time_as_utc() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://feed");

        let mut raw = raw_entry("entry-1");
        // 10:00 +02:00 is 08:00 UTC
        raw.published = chrono::FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2021, 11, 24, 10, 0, 0)
            .unwrap()
            .into();

        let downloader = FakeDownloader::new(vec![raw]);
        FeedWorker::new(feed, &downloader, 3).start(db).await.unwrap();

        let saved: Entry = entry::table.first(db).unwrap();
        assert_eq!(
            saved.published_at,
            chrono::NaiveDate::from_ymd_opt(2021, 11, 24).unwrap().and_hms_opt(8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_worker_avoids_duplicates() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://feed");

        diesel::insert_into(entry::table)
            .values(NewEntry {
                original_id: "unique-id".to_string(),
                title: String::new(),
                summary: String::new(),
                link: String::new(),
                published_at: Utc::now().naive_utc(),
                status: Entry::UNREAD.to_string(),
                feed_id: feed.id,
            })
            .execute(db)
            .unwrap();

        let downloader = FakeDownloader::new(vec![raw_entry("unique-id")]);
        FeedWorker::new(feed, &downloader, 3).start(db).await.unwrap();

        let count: i64 = entry::table.count().get_result(db).unwrap();
        assert_eq!(count, 1);

        let runs = load_runs(db);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, FeedUpdateRun::SUCCESS);
        assert_eq!(runs[0].n_downloaded, 0);
        assert_eq!(runs[0].n_ignored, 1);
    }

    #[tokio::test]
    async fn test_worker_is_idempotent() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://feed");

        let downloader = FakeDownloader::new(vec![raw_entry("a"), raw_entry("b")]);
        let worker = FeedWorker::new(feed, &downloader, 3);
        worker.start(db).await.unwrap();
        worker.start(db).await.unwrap();

        let count: i64 = entry::table.count().get_result(db).unwrap();
        assert_eq!(count, 2);

        let runs = load_runs(db);
        assert_eq!(runs.len(), 2);
        assert_eq!((runs[0].n_downloaded, runs[0].n_ignored), (2, 0));
        assert_eq!((runs[1].n_downloaded, runs[1].n_ignored), (0, 2));
    }

    #[tokio::test]
    async fn test_worker_saves_failed_runs_and_notifies_once() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://invalid-url:2323");

        let notifier = RecordingNotifier::default();
        let worker = FeedWorker::new(feed.clone(), &FailingDownloader, 3)
            .with_failure_notifier(&notifier);
        for _ in 0..3 {
            worker.start(db).await.unwrap();
        }

        let runs = load_runs(db);
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.status == FeedUpdateRun::FAILED));
        assert_eq!(
            runs.iter().map(|r| r.failure_count).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(runs[0].next_run_schedule.is_some());
        assert!(runs[1].next_run_schedule.is_some());
        assert_eq!(runs[2].next_run_schedule, None);

        assert_eq!(notifier.feed_ids(), vec![feed.id]);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let db = &mut setup_connection();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "http://feed");

        let worker = FeedWorker::new(feed.clone(), &FailingDownloader, 3);
        worker.start(db).await.unwrap();

        let downloader = FakeDownloader::new(vec![]);
        FeedWorker::new(feed.clone(), &downloader, 3).start(db).await.unwrap();

        let worker = FeedWorker::new(feed, &FailingDownloader, 3);
        worker.start(db).await.unwrap();

        let runs = load_runs(db);
        assert_eq!(
            runs.iter().map(|r| r.failure_count).collect::<Vec<_>>(),
            vec![1, 0, 1]
        );
    }

    #[test]
    fn test_backoff_progression() {
        assert_eq!(backoff_seconds(1, 3), Some(25));
        assert_eq!(backoff_seconds(2, 3), Some(45));
        assert_eq!(backoff_seconds(3, 3), None);
        assert_eq!(backoff_seconds(4, 3), None);
    }

    #[test]
    fn test_backoff_is_clamped() {
        assert_eq!(backoff_seconds(10, 20), Some(3600));
    }

    #[test]
    fn test_next_run_time_is_in_the_future() {
        let next = calculate_next_run_time(1, 3).unwrap();
        assert!(next > Utc::now().naive_utc());
        assert_eq!(calculate_next_run_time(3, 3), None);
    }
}
