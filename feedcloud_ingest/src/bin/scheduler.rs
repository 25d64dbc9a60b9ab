use dotenvy::dotenv;

use feedcloud_core::{database, logging, Settings};
use feedcloud_ingest::{broker, Scheduler};

#[tokio::main]
async fn main() {
    dotenv().ok();
    logging::init();

    let settings = Settings::from_env().expect("invalid settings");
    let pool = database::build_pool(&settings.database_url).expect("cannot open database");
    let (broker, _connection) = broker::producer(&settings, &pool)
        .await
        .expect("cannot connect to broker");

    Scheduler::from_settings(pool, broker, &settings).start().await;
}
