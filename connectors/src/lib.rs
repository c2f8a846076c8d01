pub mod db;
mod error;
mod kafka_consumer;
mod message;
pub mod settings;
mod signal;
mod sqs_consumer;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use kafka_consumer::KafkaConsumer;
use settings::{KafkaSettings, SqsSettings};
use sqs_consumer::SqsConsumer;
use tokio::sync::watch;

pub use error::{ConsumerError, ErrorExt};
pub use message::{InboundMessage, MessageLogger, Origin};
pub use signal::shutdown_signal;

pub struct Consumer<App> {
    app: Arc<App>,
    ready_tx: Arc<watch::Sender<bool>>,
}

#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn handle_message(&self, message: &InboundMessage) -> Result<(), ConsumerError>;
}

impl<App> Consumer<App> {
    pub fn new(app: App) -> Self {
        let (ready_tx, _) = watch::channel(false);

        Self {
            app: Arc::new(app),
            ready_tx: Arc::new(ready_tx),
        }
    }

    /// Flips to `true` once the broker client is receiving messages.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }
}

impl<App: Application> Consumer<App> {
    pub async fn start_kafka(&self, settings: &KafkaSettings) -> Result<(), anyhow::Error> {
        loop {
            match self.start_kafka_consumer(settings).await {
                Err(ConsumerError::Recoverable(err)) => {
                    tracing::warn!("kafka consumer stopped, will retry: {}", err);
                }
                Err(ConsumerError::Fatal(err)) => {
                    tracing::error!("encountered a fatal error, please investigate: {}", err);
                    return Err(err);
                }
                Ok(_) => unreachable!("consumer cannot exit without an error"),
            }

            tokio::time::sleep(Duration::from_secs(3)).await;
            tracing::info!("resuming consumer for group_id {}", &settings.group_id);
        }
    }

    async fn start_kafka_consumer(&self, settings: &KafkaSettings) -> Result<(), ConsumerError> {
        let kafka_consumer =
            KafkaConsumer::new(settings, self.app.clone(), self.ready_tx.clone())?;
        kafka_consumer.consume().await
    }

    pub async fn start_sqs(&self, settings: &SqsSettings) -> Result<(), anyhow::Error> {
        loop {
            match self.start_sqs_consumer(settings).await {
                Err(ConsumerError::Recoverable(err)) => {
                    tracing::warn!("sqs consumer stopped, will retry: {}", err);
                }
                Err(ConsumerError::Fatal(err)) => {
                    tracing::error!("encountered a fatal error, please investigate: {}", err);
                    return Err(err);
                }
                Ok(_) => unreachable!("consumer cannot exit without an error"),
            }

            tokio::time::sleep(Duration::from_secs(3)).await;
            tracing::info!("resuming consumer for queue {}", &settings.queue_name);
        }
    }

    async fn start_sqs_consumer(&self, settings: &SqsSettings) -> Result<(), ConsumerError> {
        let sqs_consumer = SqsConsumer::new(settings, self.app.clone()).await?;
        self.ready_tx.send_replace(true);
        sqs_consumer.consume().await
    }
}

/// Installs the fmt subscriber used by every binary. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
