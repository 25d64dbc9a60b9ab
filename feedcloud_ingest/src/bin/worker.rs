use dotenvy::dotenv;

use feedcloud_core::{database, logging, Settings};
use feedcloud_ingest::{broker, tasks, Broker, TaskConsumer};

#[tokio::main]
async fn main() {
    dotenv().ok();
    logging::init();

    let settings = Settings::from_env().expect("invalid settings");
    let pool = database::build_pool(&settings.database_url).expect("cannot open database");
    let connection = broker::connect(&settings.broker_url)
        .await
        .expect("cannot connect to broker");
    let broker = Broker::amqp(&connection).await.expect("cannot open broker channel");

    let mut consumers = Vec::new();
    for i in 0..settings.worker_concurrency {
        let consumer = TaskConsumer::amqp(&connection, &format!("feedcloud-worker-{}", i))
            .await
            .expect("cannot subscribe to task queue");
        consumers.push(tokio::spawn(tasks::run_consumer(
            consumer,
            pool.clone(),
            broker.clone(),
            settings.clone(),
        )));
    }
    tracing::info!("Worker started with {} consumers", settings.worker_concurrency);

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Worker shutting down, draining in-flight tasks");

    // Closing the connection ends the consumer streams; each loop finishes
    // its current task before it observes the closed transport.
    connection.close(200, "shutting down").await.ok();
    for consumer in consumers {
        consumer.await.ok();
    }
}
