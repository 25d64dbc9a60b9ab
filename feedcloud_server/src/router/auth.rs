use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;

use feedcloud_core::Error as CoreError;

use crate::error::Result;
use crate::payload::{AuthRequest, AuthResponse};
use crate::service;
use crate::state::AppState;

pub fn auth_router() -> Router<AppState> {
    Router::new().route("/auth/", post(authenticate))
}

async fn authenticate(
    State(app_state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<AuthResponse>> {
    let user = {
        let db = &mut app_state.pool.get()?;
        service::authenticate_user(db, &request.username, &request.password)?
    };
    let Some(user) = user else {
        return Err(CoreError::AuthorizationFailed("Invalid username or password".to_string()).into());
    };

    let token = app_state.tokens.create_token(&user.username)?;
    Ok(Json(AuthResponse { token }))
}
