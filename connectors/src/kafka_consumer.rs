use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::DateTime;
use rdkafka::{
    config::RDKafkaLogLevel,
    consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer},
    message::{BorrowedMessage, Headers},
    ClientConfig, ClientContext, Message,
};
use tokio::sync::watch;

use crate::{
    error::ConsumerError,
    message::{InboundMessage, Origin},
    settings::KafkaSettings,
    Application,
};

pub struct KafkaConsumer<App: Application> {
    consumer: StreamConsumer<KafkaConsumerContext>,
    app: Arc<App>,
}

struct KafkaConsumerContext {
    ready_tx: Arc<watch::Sender<bool>>,
}

impl ClientContext for KafkaConsumerContext {}

impl ConsumerContext for KafkaConsumerContext {
    fn pre_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        match rebalance {
            Rebalance::Revoke(revocations) => {
                tracing::info!("revocations received");

                for rev in revocations.elements().iter() {
                    tracing::info!("- topic: {}, partition: {}", rev.topic(), rev.partition());
                }
            }
            Rebalance::Error(err) => {
                tracing::warn!("kafka rebalancing error: {}", err)
            }
            Rebalance::Assign(_) => {}
        }
    }

    fn post_rebalance<'a>(&self, rebalance: &Rebalance<'a>) {
        if let Rebalance::Assign(assignments) = rebalance {
            tracing::info!("assignments received");

            for ass in assignments.elements().iter() {
                tracing::info!("+ topic: {}, partition: {}", ass.topic(), ass.partition());
            }

            // the first session to come up is what the binary waits on
            self.ready_tx.send_replace(true);
        }
    }
}

impl<App: Application> KafkaConsumer<App> {
    pub fn new(
        settings: &KafkaSettings,
        app: Arc<App>,
        ready_tx: Arc<watch::Sender<bool>>,
    ) -> Result<Self, ConsumerError> {
        let context = KafkaConsumerContext { ready_tx };

        let consumer: StreamConsumer<KafkaConsumerContext> = ClientConfig::new()
            .set("group.id", &settings.group_id)
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .set("auto.offset.reset", "earliest")
            .set("partition.assignment.strategy", "roundrobin")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            // Commit automatically every 5 seconds
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            // but only commit the offsets explicitly stored via `consumer.store_offset`.
            .set("enable.auto.offset.store", "false")
            .set_log_level(RDKafkaLogLevel::Info)
            .create_with_context(context)?;

        consumer.subscribe(&[settings.topic.as_str()])?;

        Ok(Self { consumer, app })
    }

    pub async fn consume(self) -> Result<(), ConsumerError> {
        loop {
            let msg = match self.consumer.recv().await {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::error!("error from consumer, will recreate it: {}", err);

                    return Err(ConsumerError::Recoverable(anyhow!(
                        "Unexpected Kafka error: {}",
                        err
                    )));
                }
            };

            self.handle(&msg).await?;
        }
    }

    async fn handle(&self, msg: &BorrowedMessage<'_>) -> Result<(), ConsumerError> {
        let message = inbound_message(msg);

        loop {
            match self.app.handle_message(&message).await {
                Ok(()) => {
                    // mark the message as processed
                    if let Err(err) = self.consumer.store_offset_from_message(msg) {
                        // expected while a rebalance is in flight
                        tracing::warn!("failed to update offset store, will carry on {}", err);
                    }

                    return Ok(());
                }
                Err(ConsumerError::Recoverable(err)) => {
                    tracing::warn!(
                        "application reported a recoverable error: {}, retrying the message after a delay",
                        err
                    );

                    tokio::time::sleep(Duration::from_secs(3)).await;
                }
                Err(ConsumerError::Fatal(err)) => {
                    tracing::error!(
                        "application reported an unrecoverable error, stopping the consumer: {}",
                        err
                    );

                    return Err(ConsumerError::Fatal(err));
                }
            }
        }
    }
}

fn inbound_message(msg: &BorrowedMessage<'_>) -> InboundMessage {
    let attributes = msg
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    let value = header
                        .value
                        .map(|v| String::from_utf8_lossy(v).into_owned())
                        .unwrap_or_default();
                    (header.key.to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    InboundMessage {
        origin: Origin::Kafka {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            timestamp: msg
                .timestamp()
                .to_millis()
                .and_then(DateTime::from_timestamp_millis),
        },
        key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        body: msg
            .payload()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default(),
        attributes,
    }
}
