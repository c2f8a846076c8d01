use clap::Parser;
use connectors::{settings::KafkaSettings, shutdown_signal, Consumer, MessageLogger};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    connectors::init_tracing();

    let settings = KafkaSettings::parse();

    tracing::info!("Starting Kafka consumer");
    tracing::info!("Bootstrap servers: {}", settings.bootstrap_servers);
    tracing::info!("Topic: {}", settings.topic);
    tracing::info!("Group ID: {}", settings.group_id);

    let consumer = Consumer::new(MessageLogger);
    let mut ready = consumer.ready();

    let run = consumer.start_kafka(&settings);
    tokio::pin!(run);

    tokio::select! {
        res = &mut run => return res,
        _ = ready.wait_for(|ready| *ready) => {
            tracing::info!("Kafka consumer is ready and running");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutting down consumer...");
            return Ok(());
        }
    }

    tokio::select! {
        res = &mut run => res,
        _ = shutdown_signal() => {
            tracing::info!("Shutting down consumer...");
            Ok(())
        }
    }
}
