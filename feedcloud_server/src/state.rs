use feedcloud_core::auth::TokenService;
use feedcloud_core::DatabasePool;
use feedcloud_ingest::Broker;

#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub broker: Broker,
    pub tokens: TokenService,
}
