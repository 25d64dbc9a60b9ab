use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use feedcloud_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug)]
pub struct ServerError(anyhow::Error);

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        for cause in self.0.chain() {
            if let Some(err) = cause.downcast_ref::<CoreError>() {
                match err {
                    CoreError::AuthorizationFailed(_) => return StatusCode::UNAUTHORIZED,
                    CoreError::ObjectNotFound(_) => return StatusCode::NOT_FOUND,
                    CoreError::ObjectAlreadyExists(_) => return StatusCode::CONFLICT,
                    CoreError::Validation(_) => return StatusCode::BAD_REQUEST,
                    _ => return StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
