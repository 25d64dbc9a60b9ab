use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = user)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = user)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Queryable, QueryableByName, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = feed)]
#[diesel(belongs_to(User))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Feed {
    pub id: i32,
    pub url: String,
    pub user_id: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = feed)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewFeed {
    pub url: String,
    pub user_id: i32,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = entry)]
#[diesel(belongs_to(Feed))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Entry {
    pub id: i32,
    pub original_id: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: NaiveDateTime,
    pub saved_at: NaiveDateTime,
    pub status: String,
    pub feed_id: i32,
}

impl Entry {
    pub const UNREAD: &'static str = "unread";
    pub const READ: &'static str = "read";
    pub const STATUS_LIST: [&'static str; 2] = [Self::UNREAD, Self::READ];
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = entry)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewEntry {
    pub original_id: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: NaiveDateTime,
    pub status: String,
    pub feed_id: i32,
}

/// One refresh attempt for a feed. The newest run per feed defines the
/// feed's scheduling state.
#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = feed_update_run)]
#[diesel(belongs_to(Feed))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FeedUpdateRun {
    pub id: i32,
    pub timestamp: NaiveDateTime,
    pub status: String,
    pub failure_count: i32,
    pub next_run_schedule: Option<NaiveDateTime>,
    pub n_downloaded: i32,
    pub n_ignored: i32,
    pub feed_id: i32,
}

impl FeedUpdateRun {
    pub const SUCCESS: &'static str = "success";
    pub const FAILED: &'static str = "failed";
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = feed_update_run)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewFeedUpdateRun {
    pub timestamp: NaiveDateTime,
    pub status: String,
    pub failure_count: i32,
    pub next_run_schedule: Option<NaiveDateTime>,
    pub n_downloaded: i32,
    pub n_ignored: i32,
    pub feed_id: i32,
}
