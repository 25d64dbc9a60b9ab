use dotenvy::dotenv;

use feedcloud_core::auth::TokenService;
use feedcloud_core::{database, logging, Settings};
use feedcloud_ingest::broker;
use feedcloud_server::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    logging::init();

    let settings = Settings::from_env().expect("invalid settings");
    let pool = database::build_pool(&settings.database_url).expect("cannot open database");
    let (broker, _connection) = broker::producer(&settings, &pool)
        .await
        .expect("cannot connect to broker");
    let tokens = TokenService::new(&settings.jwt_secret);

    let app = feedcloud_server::app(AppState { pool, broker, tokens });

    let addr: std::net::SocketAddr = settings.server_address.parse().expect("invalid server address");
    tracing::info!("Server starting at {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
