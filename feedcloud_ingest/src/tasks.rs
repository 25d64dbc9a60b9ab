use diesel::prelude::*;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use feed_client::FeedClient;
use feedcloud_core::model::{Feed, User};
use feedcloud_core::{DatabasePool, Result, Settings};

use crate::broker::{Broker, Task, TaskConsumer};
use crate::worker::{Downloader, FeedWorker};

const NOTIFY_RETRY_DELAY_MS: u64 = 1000;
const NOTIFY_RETRY_COUNT: usize = 3;

/// Drain a task consumer until its transport closes. Each worker process
/// runs several of these loops concurrently.
pub async fn run_consumer(
    mut consumer: TaskConsumer,
    pool: DatabasePool,
    broker: Broker,
    settings: Settings,
) {
    let downloader = FeedClient::new();
    while let Some(task) = consumer.recv().await {
        run_task(&pool, &broker, &settings, &downloader, task).await;
    }
    tracing::info!("Task consumer stopped");
}

/// Execute one task. Errors are logged, never propagated: retry policy is
/// domain-driven through failure runs, not transport redelivery.
pub async fn run_task(
    pool: &DatabasePool,
    broker: &Broker,
    settings: &Settings,
    downloader: &dyn Downloader,
    task: Task,
) {
    let result = match task {
        Task::DownloadFeed { feed_id } => {
            download_feed(pool, broker, settings, downloader, feed_id).await
        }
        Task::NotifyUserOnFailure { feed_id } => notify_user_on_failure(pool, feed_id).await,
    };
    if let Err(e) = result {
        tracing::error!("Task failed: {}", e);
    }
}

/// Execute one refresh attempt for one feed.
pub async fn download_feed(
    pool: &DatabasePool,
    broker: &Broker,
    settings: &Settings,
    downloader: &dyn Downloader,
    feed_id: i32,
) -> Result<()> {
    use feedcloud_core::schema::feed;

    tracing::info!("Downloading feed {}", feed_id);
    let feed = {
        let db = &mut pool.get()?;
        feed::table.find(feed_id).first::<Feed>(db).optional()?
    };
    // A feed deleted after its task was enqueued is not an error.
    let Some(feed) = feed else {
        tracing::warn!("Feed not found: feed_id={}", feed_id);
        return Ok(());
    };

    let worker = FeedWorker::new(feed, downloader, settings.feed_max_failure_count)
        .with_failure_notifier(broker);
    let db = &mut pool.get()?;
    worker.start(db).await?;

    tracing::info!("Finished processing feed {}", feed_id);
    Ok(())
}

/// Tell the owner that their feed has permanently failed. The delivery is a
/// stub; transport-level hiccups are retried a few times on their own.
pub async fn notify_user_on_failure(pool: &DatabasePool, feed_id: i32) -> Result<()> {
    let strategy = FixedInterval::from_millis(NOTIFY_RETRY_DELAY_MS).take(NOTIFY_RETRY_COUNT);
    Retry::spawn(strategy, || async { send_failure_notification(pool, feed_id) }).await
}

fn send_failure_notification(pool: &DatabasePool, feed_id: i32) -> Result<()> {
    use feedcloud_core::schema::{feed, user};

    let db = &mut pool.get()?;
    let owner = feed::table
        .inner_join(user::table)
        .filter(feed::id.eq(feed_id))
        .select((Feed::as_select(), User::as_select()))
        .first::<(Feed, User)>(db)
        .optional()?;

    let Some((feed, user)) = owner else {
        tracing::warn!("Cannot notify about feed {}: feed is gone", feed_id);
        return Ok(());
    };

    tracing::warn!(
        "Feed {} ({}) of user {} has permanently failed. Notifying user...",
        feed.id,
        feed.url,
        user.username
    );
    Ok(())
}
