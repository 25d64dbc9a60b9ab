//! Deterministic stand-ins for the downloader, the notifier and the
//! database, shared by the unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::SqliteConnection;

use feed_client::error::{Error as FeedError, Result as FeedResult};
use feed_client::RawEntry;
use feedcloud_core::database::{self, DatabasePool};
use feedcloud_core::model::{Feed, NewFeed, NewFeedUpdateRun, NewUser, User};
use feedcloud_core::Database;

use crate::broker::{Task, TaskConsumer};
use crate::worker::{Downloader, FailureNotifier};

/// A feed downloader which returns the given entries on every call.
pub struct FakeDownloader {
    entries: Vec<RawEntry>,
}

impl FakeDownloader {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, _url: &str) -> FeedResult<Vec<RawEntry>> {
        Ok(self.entries.clone())
    }
}

/// A downloader that fails every URL with a parse error.
pub struct FailingDownloader;

#[async_trait]
impl Downloader for FailingDownloader {
    async fn download(&self, url: &str) -> FeedResult<Vec<RawEntry>> {
        Err(FeedError::ParseError(format!("cannot read {}", url)))
    }
}

/// A downloader with per-URL behavior: URLs given entries succeed, all
/// others fail. Entries can be swapped mid-test to simulate a feed being
/// fixed.
#[derive(Default)]
pub struct ScriptedDownloader {
    feeds: Mutex<HashMap<String, Vec<RawEntry>>>,
}

impl ScriptedDownloader {
    pub fn set(&self, url: &str, entries: Vec<RawEntry>) {
        self.feeds.lock().unwrap().insert(url.to_string(), entries);
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(&self, url: &str) -> FeedResult<Vec<RawEntry>> {
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FeedError::ParseError(format!("cannot read {}", url)))
    }
}

/// Records which feeds were reported as permanently failed.
#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<i32>>,
}

impl RecordingNotifier {
    pub fn feed_ids(&self) -> Vec<i32> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, feed_id: i32) {
        self.notified.lock().unwrap().push(feed_id);
    }
}

/// A fresh in-memory database with the schema applied.
pub fn setup_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").expect("cannot open in-memory database");
    conn.batch_execute("PRAGMA foreign_keys = ON;").unwrap();
    database::create_all(&mut conn).expect("cannot run migrations");
    conn
}

/// A pool over a shared in-memory database. Each test should pass its own
/// name so databases never leak between tests; the pool's idle connections
/// keep the database alive for the test's lifetime.
pub fn setup_pool(name: &str) -> DatabasePool {
    let url = format!("file:{}?mode=memory&cache=shared", name);
    let pool = database::build_pool(&url).expect("cannot build test pool");
    database::create_all(&mut pool.get().unwrap()).expect("cannot run migrations");
    pool
}

pub fn create_user(db: Database<'_>, username: &str) -> User {
    use feedcloud_core::schema::user;
    diesel::insert_into(user::table)
        .values(NewUser {
            username: username.to_string(),
            password_hash: "x".to_string(),
            is_admin: false,
        })
        .get_result(db)
        .unwrap()
}

pub fn create_feed(db: Database<'_>, user_id: i32, url: &str) -> Feed {
    use feedcloud_core::schema::feed;
    diesel::insert_into(feed::table)
        .values(NewFeed {
            url: url.to_string(),
            user_id,
        })
        .get_result(db)
        .unwrap()
}

pub fn create_run(
    db: Database<'_>,
    feed_id: i32,
    status: &str,
    failure_count: i32,
    timestamp: NaiveDateTime,
    next_run_schedule: Option<NaiveDateTime>,
) {
    use feedcloud_core::schema::feed_update_run;
    diesel::insert_into(feed_update_run::table)
        .values(NewFeedUpdateRun {
            timestamp,
            status: status.to_string(),
            failure_count,
            next_run_schedule,
            n_downloaded: 0,
            n_ignored: 0,
            feed_id,
        })
        .execute(db)
        .unwrap();
}

pub fn raw_entry(id: &str) -> RawEntry {
    RawEntry {
        id: id.to_string(),
        title: format!("Entry {}", id),
        description: String::new(),
        link: format!("http://feed/{}", id),
        published: Utc.with_ymd_and_hms(2021, 11, 24, 10, 0, 0).unwrap(),
    }
}

/// Collect every task currently sitting in the queue.
pub async fn drain_tasks(consumer: &mut TaskConsumer) -> Vec<Task> {
    let mut tasks = Vec::new();
    while let Ok(Some(task)) =
        tokio::time::timeout(Duration::from_millis(50), consumer.recv()).await
    {
        tasks.push(task);
    }
    tasks
}
