//! End-to-end exercise of the ingestion control plane over the in-memory
//! broker: scheduling, the backoff ladder into terminal failure, and
//! recovery through a force-run.

use std::time::Duration;

use diesel::prelude::*;

use feedcloud_core::model::FeedUpdateRun;
use feedcloud_core::schema::feed_update_run;
use feedcloud_core::Settings;
use feedcloud_ingest::testing::{
    create_feed, create_user, drain_tasks, raw_entry, setup_pool, ScriptedDownloader,
};
use feedcloud_ingest::{tasks, Broker, Downloader, Scheduler, Task, TaskConsumer};

struct Harness {
    pool: feedcloud_core::DatabasePool,
    broker: Broker,
    consumer: TaskConsumer,
    settings: Settings,
    downloader: ScriptedDownloader,
}

impl Harness {
    fn new(name: &str) -> Self {
        let pool = setup_pool(name);
        let (broker, consumer) = Broker::memory();
        let settings = Settings {
            is_testing: true,
            ..Default::default()
        };
        Self {
            pool,
            broker,
            consumer,
            settings,
            downloader: ScriptedDownloader::default(),
        }
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.pool.clone(), self.broker.clone(), Duration::from_secs(60))
    }

    /// Execute queued tasks, including the ones they enqueue themselves,
    /// until the queue is dry. Returns the executed tasks in order.
    async fn work_off_queue(&mut self) -> Vec<Task> {
        let mut executed = Vec::new();
        loop {
            let tasks = drain_tasks(&mut self.consumer).await;
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                tasks::run_task(
                    &self.pool,
                    &self.broker,
                    &self.settings,
                    &self.downloader as &dyn Downloader,
                    task.clone(),
                )
                .await;
                executed.push(task);
            }
        }
        executed
    }

    fn run_count(&self) -> i64 {
        let db = &mut self.pool.get().unwrap();
        feed_update_run::table.count().get_result(db).unwrap()
    }
}

#[tokio::test]
async fn test_backoff_latches_and_force_run_recovers() {
    let mut harness = Harness::new("ingestion_backoff_simulation");
    let feed = {
        let db = &mut harness.pool.get().unwrap();
        let user = create_user(db, "test");
        create_feed(db, user.id, "http://invalid-url:2323")
    };

    // Drive the feed into terminal failure. The in-between retry delays are
    // seconds long, so the attempts are fed to the worker directly instead
    // of waiting out the scheduler's cooldown windows.
    for _ in 0..3 {
        harness.broker.send(Task::DownloadFeed { feed_id: feed.id }).await.unwrap();
        let executed = harness.work_off_queue().await;
        assert!(executed.contains(&Task::DownloadFeed { feed_id: feed.id }));
    }
    assert_eq!(harness.run_count(), 3);

    {
        let db = &mut harness.pool.get().unwrap();
        let runs: Vec<FeedUpdateRun> = feed_update_run::table
            .order((feed_update_run::timestamp.asc(), feed_update_run::id.asc()))
            .load(db)
            .unwrap();
        assert_eq!(
            runs.iter().map(|r| r.failure_count).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(runs.last().unwrap().next_run_schedule, None);
    }

    // The terminal run emitted the notification exactly once; it was
    // executed as part of working off the queue above, so the queue must be
    // empty now.
    assert!(drain_tasks(&mut harness.consumer).await.is_empty());

    // A terminally-failed feed is no longer scheduled.
    let enqueued = harness.scheduler().run_once().await.unwrap();
    assert_eq!(enqueued, 0);
    harness.work_off_queue().await;
    assert_eq!(harness.run_count(), 3);

    // Fix the feed and force-run it, bypassing the scheduler.
    harness.downloader.set("http://invalid-url:2323", vec![raw_entry("entry-1")]);
    harness.broker.send(Task::DownloadFeed { feed_id: feed.id }).await.unwrap();
    harness.work_off_queue().await;
    assert_eq!(harness.run_count(), 4);

    {
        let db = &mut harness.pool.get().unwrap();
        let latest: FeedUpdateRun = feed_update_run::table
            .order((feed_update_run::timestamp.desc(), feed_update_run::id.desc()))
            .first(db)
            .unwrap();
        assert_eq!(latest.status, FeedUpdateRun::SUCCESS);
    }

    // With a success run on top, the scheduler picks the feed again.
    let enqueued = harness.scheduler().run_once().await.unwrap();
    assert_eq!(enqueued, 1);
    harness.work_off_queue().await;
    assert_eq!(harness.run_count(), 5);
}

#[tokio::test]
async fn test_terminal_failure_notifies_exactly_once() {
    let mut harness = Harness::new("ingestion_notify_once");
    let feed = {
        let db = &mut harness.pool.get().unwrap();
        let user = create_user(db, "test");
        create_feed(db, user.id, "http://invalid-url:2323")
    };

    let mut notifications = 0;
    for _ in 0..3 {
        harness.broker.send(Task::DownloadFeed { feed_id: feed.id }).await.unwrap();
        let executed = harness.work_off_queue().await;
        notifications += executed
            .iter()
            .filter(|t| matches!(t, Task::NotifyUserOnFailure { .. }))
            .count();
    }
    assert_eq!(notifications, 1);
}

#[tokio::test]
async fn test_download_task_for_deleted_feed_is_a_no_op() {
    let mut harness = Harness::new("ingestion_deleted_feed");
    harness.broker.send(Task::DownloadFeed { feed_id: 424242 }).await.unwrap();
    harness.work_off_queue().await;
    assert_eq!(harness.run_count(), 0);
}
