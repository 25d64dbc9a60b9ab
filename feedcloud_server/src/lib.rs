pub mod error;
pub mod extract;
pub mod payload;
pub mod router;
pub mod service;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(router::auth::auth_router())
        .merge(router::feed::feed_router())
        .merge(router::entry::entry_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
