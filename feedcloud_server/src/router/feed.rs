use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::error::Result;
use crate::extract::CurrentUser;
use crate::payload::{EntryListQuery, EntryListResponse, FeedListResponse, MessageResponse, NewFeedRequest};
use crate::service;
use crate::state::AppState;

pub fn feed_router() -> Router<AppState> {
    Router::new()
        .route("/feeds/", post(register_feed).get(get_feeds))
        .route("/feeds/:id", delete(delete_feed))
        .route("/feeds/:id/force-run", put(force_run_feed))
        .route("/feeds/:id/entries/", get(get_feed_entries))
}

async fn register_feed(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<NewFeedRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let db = &mut app_state.pool.get()?;
    service::register_feed(db, &user, &request.url)?;
    Ok((StatusCode::CREATED, Json(MessageResponse::new("Created"))))
}

async fn get_feeds(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<FeedListResponse>> {
    let db = &mut app_state.pool.get()?;
    let feeds = service::get_feeds(db, &user)?.into_iter().map(Into::into).collect();
    Ok(Json(FeedListResponse { feeds }))
}

async fn delete_feed(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>> {
    let db = &mut app_state.pool.get()?;
    service::unregister_feed(db, &user, id)?;
    Ok(Json(MessageResponse::new("Deleted")))
}

async fn force_run_feed(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>> {
    let db = &mut app_state.pool.get()?;
    service::force_run_feed(db, &user, id, &app_state.broker).await?;
    Ok(Json(MessageResponse::new("Scheduled")))
}

async fn get_feed_entries(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Query(query): Query<EntryListQuery>,
) -> Result<Json<EntryListResponse>> {
    let db = &mut app_state.pool.get()?;
    let entries = service::get_feed_entries(db, &user, id, query.status.as_deref())?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(EntryListResponse { entries }))
}
