//! Service layer between the routers and the database. Every operation on
//! feeds and entries filters by the owning user; a resource belonging to
//! someone else is indistinguishable from a missing one.

use diesel::prelude::*;

use feedcloud_core::model::{Entry, Feed, NewFeed, User};
use feedcloud_core::{auth, Database, Error, Result};
use feedcloud_ingest::{Broker, Task};

pub fn find_user(db: Database<'_>, username: &str) -> Result<Option<User>> {
    use feedcloud_core::schema::user;
    Ok(user::table
        .filter(user::username.eq(username))
        .first::<User>(db)
        .optional()?)
}

/// Check a username/password pair, returning the user on success.
pub fn authenticate_user(db: Database<'_>, username: &str, password: &str) -> Result<Option<User>> {
    let Some(user) = find_user(db, username)? else {
        return Ok(None);
    };
    if auth::check_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Register a feed for the user. The `(url, user_id)` pair must be new;
/// the same URL under another user is fine.
pub fn register_feed(db: Database<'_>, user: &User, url: &str) -> Result<Feed> {
    use feedcloud_core::schema::feed;

    let existing: i64 = feed::table
        .filter(feed::url.eq(url))
        .filter(feed::user_id.eq(user.id))
        .count()
        .get_result(db)?;
    if existing != 0 {
        return Err(Error::ObjectAlreadyExists(format!("Feed {}", url)));
    }

    let feed = diesel::insert_into(feed::table)
        .values(NewFeed {
            url: url.to_string(),
            user_id: user.id,
        })
        .get_result(db)?;
    tracing::info!("User {} registered feed {}", user.username, url);
    Ok(feed)
}

/// Delete a feed owned by the user. Entries and runs go with it through
/// the foreign-key cascade.
pub fn unregister_feed(db: Database<'_>, user: &User, feed_id: i32) -> Result<()> {
    use feedcloud_core::schema::feed;

    let feed = get_feed(db, user, feed_id)?;
    diesel::delete(feed::table.find(feed.id)).execute(db)?;
    tracing::info!("User {} deleted feed {}", user.username, feed_id);
    Ok(())
}

/// Enqueue a download for a feed owned by the user right now, bypassing the
/// scheduler. The run history stays untouched; a terminally-failed feed
/// recovers when this attempt succeeds.
pub async fn force_run_feed(db: Database<'_>, user: &User, feed_id: i32, broker: &Broker) -> Result<()> {
    let feed = get_feed(db, user, feed_id)?;
    broker.send(Task::DownloadFeed { feed_id: feed.id }).await?;
    tracing::info!("User {} force-ran feed {}", user.username, feed.id);
    Ok(())
}

pub fn get_feeds(db: Database<'_>, user: &User) -> Result<Vec<Feed>> {
    use feedcloud_core::schema::feed;
    Ok(feed::table
        .filter(feed::user_id.eq(user.id))
        .order(feed::id.asc())
        .load(db)?)
}

pub fn get_feed(db: Database<'_>, user: &User, feed_id: i32) -> Result<Feed> {
    use feedcloud_core::schema::feed;
    feed::table
        .filter(feed::id.eq(feed_id))
        .filter(feed::user_id.eq(user.id))
        .first::<Feed>(db)
        .optional()?
        .ok_or_else(|| Error::ObjectNotFound(format!("Feed {}", feed_id)))
}

pub fn get_feed_entries(
    db: Database<'_>,
    user: &User,
    feed_id: i32,
    status: Option<&str>,
) -> Result<Vec<Entry>> {
    use feedcloud_core::schema::entry;

    let feed = get_feed(db, user, feed_id)?;

    let mut query = entry::table.filter(entry::feed_id.eq(feed.id)).into_boxed();
    if let Some(status) = status {
        validate_status(status)?;
        query = query.filter(entry::status.eq(status.to_string()));
    }
    Ok(query
        .order((entry::published_at.desc(), entry::id.desc()))
        .load(db)?)
}

pub fn get_all_entries(db: Database<'_>, user: &User, status: Option<&str>) -> Result<Vec<Entry>> {
    use feedcloud_core::schema::{entry, feed};

    let mut query = entry::table
        .inner_join(feed::table)
        .filter(feed::user_id.eq(user.id))
        .select(Entry::as_select())
        .into_boxed();
    if let Some(status) = status {
        validate_status(status)?;
        query = query.filter(entry::status.eq(status.to_string()));
    }
    Ok(query
        .order((entry::published_at.desc(), entry::id.desc()))
        .load(db)?)
}

pub fn set_entry_status(db: Database<'_>, user: &User, entry_id: i32, status: &str) -> Result<()> {
    use feedcloud_core::schema::{entry, feed};

    validate_status(status)?;

    let owned: Option<Entry> = entry::table
        .inner_join(feed::table)
        .filter(entry::id.eq(entry_id))
        .filter(feed::user_id.eq(user.id))
        .select(Entry::as_select())
        .first(db)
        .optional()?;
    let entry = owned.ok_or_else(|| Error::ObjectNotFound(format!("Entry {}", entry_id)))?;

    diesel::update(entry::table.find(entry.id))
        .set(entry::status.eq(status.to_string()))
        .execute(db)?;
    Ok(())
}

fn validate_status(status: &str) -> Result<()> {
    if Entry::STATUS_LIST.contains(&status) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "status must be one of {:?}, got `{}`",
            Entry::STATUS_LIST,
            status
        )))
    }
}
