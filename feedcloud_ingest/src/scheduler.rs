use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{Text, Timestamp};

use feedcloud_core::model::{Feed, FeedUpdateRun};
use feedcloud_core::{Database, DatabasePool, Result, Settings};

use crate::broker::{Broker, Task};

/// Periodically finds the feeds that are due for an update and enqueues one
/// download task per feed. Does not download anything itself.
pub struct Scheduler {
    pool: DatabasePool,
    broker: Broker,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pool: DatabasePool, broker: Broker, interval: Duration) -> Self {
        Self {
            pool,
            broker,
            interval,
        }
    }

    pub fn from_settings(pool: DatabasePool, broker: Broker, settings: &Settings) -> Self {
        Self::new(
            pool,
            broker,
            Duration::from_secs(settings.task_scheduler_interval_seconds),
        )
    }

    /// Run cycles until the process receives a shutdown signal. A faulty
    /// cycle is logged and the next one proceeds.
    pub async fn start(&self) {
        tracing::info!("Scheduler started, interval {:?}", self.interval);
        let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
        loop {
            match self.run_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Enqueued {} due feeds", n),
                Err(e) => tracing::error!("Scheduler cycle failed: {}", e),
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One scheduling cycle: enqueue a download task for every due feed.
    pub async fn run_once(&self) -> Result<usize> {
        let feeds = {
            let db = &mut self.pool.get()?;
            Self::find_due_feeds(db)?
        };

        let count = feeds.len();
        for feed in feeds {
            self.broker.send(Task::DownloadFeed { feed_id: feed.id }).await?;
        }
        Ok(count)
    }

    /// Find feeds that are ready to be downloaded.
    ///
    /// Only the latest run of each feed decides: a feed is due when it was
    /// never attempted, when its latest run succeeded, or when its latest
    /// run failed with a retry scheduled before now. A failed run without a
    /// schedule latches the feed out of rotation until a force-run succeeds.
    ///
    /// The per-feed `ORDER BY ... LIMIT 1` subselect is beyond diesel's
    /// query DSL, hence raw SQL.
    pub fn find_due_feeds(db: Database<'_>) -> Result<Vec<Feed>> {
        let feeds = diesel::sql_query(
            "SELECT feed.id, feed.url, feed.user_id \
             FROM feed \
             LEFT JOIN feed_update_run AS last_run ON last_run.id = \
                 (SELECT id FROM feed_update_run \
                  WHERE feed_update_run.feed_id = feed.id \
                  ORDER BY timestamp DESC, id DESC LIMIT 1) \
             WHERE last_run.id IS NULL \
                OR last_run.status <> ? \
                OR (last_run.status = ? \
                    AND last_run.next_run_schedule IS NOT NULL \
                    AND last_run.next_run_schedule < ?)",
        )
        .bind::<Text, _>(FeedUpdateRun::FAILED)
        .bind::<Text, _>(FeedUpdateRun::FAILED)
        .bind::<Timestamp, _>(Utc::now().naive_utc())
        .load::<Feed>(db)?;
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::testing::{create_feed, create_run, create_user, drain_tasks, setup_pool};

    #[tokio::test]
    async fn test_scheduler_picks_correct_feeds() {
        let pool = setup_pool("scheduler_picks_correct_feeds");
        let db = &mut pool.get().unwrap();
        let user = create_user(db, "test");

        let not_run_feed = create_feed(db, user.id, "not_run");
        let successful_feed = create_feed(db, user.id, "successful");
        let once_failed_feed = create_feed(db, user.id, "once_failed");
        let totally_failed_feed = create_feed(db, user.id, "totally_failed");

        let now = Utc::now().naive_utc();
        create_run(db, successful_feed.id, FeedUpdateRun::SUCCESS, 0, now, None);
        create_run(
            db,
            once_failed_feed.id,
            FeedUpdateRun::FAILED,
            1,
            now - ChronoDuration::hours(2),
            Some(now - ChronoDuration::hours(1)),
        );
        for i in 1..=3 {
            let timestamp = now - ChronoDuration::hours(3 - i);
            let next_run = (i < 3).then(|| timestamp + ChronoDuration::seconds(30));
            create_run(db, totally_failed_feed.id, FeedUpdateRun::FAILED, i as i32, timestamp, next_run);
        }

        let feeds = Scheduler::find_due_feeds(db).unwrap();
        let mut ids: Vec<i32> = feeds.iter().map(|f| f.id).collect();
        ids.sort();
        assert_eq!(ids, vec![not_run_feed.id, successful_feed.id, once_failed_feed.id]);
    }

    #[tokio::test]
    async fn test_cooling_feed_is_skipped() {
        let pool = setup_pool("scheduler_cooling_feed");
        let db = &mut pool.get().unwrap();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "cooling");

        let now = Utc::now().naive_utc();
        create_run(
            db,
            feed.id,
            FeedUpdateRun::FAILED,
            1,
            now,
            Some(now + ChronoDuration::seconds(25)),
        );

        let feeds = Scheduler::find_due_feeds(db).unwrap();
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn test_only_latest_run_counts() {
        let pool = setup_pool("scheduler_latest_run");
        let db = &mut pool.get().unwrap();
        let user = create_user(db, "test");
        let feed = create_feed(db, user.id, "recovered");

        // An old terminal failure superseded by a fresh success.
        let now = Utc::now().naive_utc();
        create_run(db, feed.id, FeedUpdateRun::FAILED, 3, now - ChronoDuration::hours(1), None);
        create_run(db, feed.id, FeedUpdateRun::SUCCESS, 0, now, None);

        let feeds = Scheduler::find_due_feeds(db).unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].id, feed.id);
    }

    #[tokio::test]
    async fn test_run_once_enqueues_due_feeds() {
        let pool = setup_pool("scheduler_run_once");
        let (broker, mut consumer) = Broker::memory();
        let feed = {
            let db = &mut pool.get().unwrap();
            let user = create_user(db, "test");
            create_feed(db, user.id, "not_run")
        };

        let scheduler = Scheduler::new(pool, broker, Duration::from_secs(60));
        let enqueued = scheduler.run_once().await.unwrap();
        assert_eq!(enqueued, 1);

        let tasks = drain_tasks(&mut consumer).await;
        assert_eq!(tasks, vec![Task::DownloadFeed { feed_id: feed.id }]);
    }
}
