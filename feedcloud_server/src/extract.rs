use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use feedcloud_core::model::User;
use feedcloud_core::Error as CoreError;

use crate::error::ServerError;
use crate::service;
use crate::state::AppState;

/// The authenticated caller, resolved from the bearer token. Identity is
/// the token's subject, looked up as a username.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| CoreError::AuthorizationFailed("Missing bearer token".to_string()))?;

        let claims = app_state
            .tokens
            .verify_token(token)
            .map_err(|_| CoreError::AuthorizationFailed("Invalid or expired token".to_string()))?;

        let db = &mut app_state.pool.get()?;
        let user = service::find_user(db, &claims.sub)?
            .ok_or_else(|| CoreError::AuthorizationFailed("Unknown user".to_string()))?;

        Ok(CurrentUser(user))
    }
}
