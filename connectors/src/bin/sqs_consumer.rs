use clap::Parser;
use connectors::{settings::SqsSettings, shutdown_signal, Consumer, MessageLogger};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    connectors::init_tracing();

    let settings = SqsSettings::parse();
    tracing::info!("Starting SQS consumer for queue: {}", settings.queue_name);

    let consumer = Consumer::new(MessageLogger);

    tokio::select! {
        res = consumer.start_sqs(&settings) => res,
        _ = shutdown_signal() => {
            tracing::info!("Shutting down...");
            Ok(())
        }
    }
}
