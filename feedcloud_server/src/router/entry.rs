use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;

use crate::error::Result;
use crate::extract::CurrentUser;
use crate::payload::{EntryListQuery, EntryListResponse, EntryStatusRequest, MessageResponse};
use crate::service;
use crate::state::AppState;

pub fn entry_router() -> Router<AppState> {
    Router::new()
        .route("/entries/", get(get_entries))
        .route("/entries/:id", put(set_entry_status))
}

async fn get_entries(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<EntryListQuery>,
) -> Result<Json<EntryListResponse>> {
    let db = &mut app_state.pool.get()?;
    let entries = service::get_all_entries(db, &user, query.status.as_deref())?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(EntryListResponse { entries }))
}

async fn set_entry_status(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
    Json(request): Json<EntryStatusRequest>,
) -> Result<Json<MessageResponse>> {
    let db = &mut app_state.pool.get()?;
    service::set_entry_status(db, &user, id, &request.status)?;
    Ok(Json(MessageResponse::new("Updated")))
}
