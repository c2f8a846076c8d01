use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::{types::Message, Client, Error as SqsError};

use crate::{
    error::ConsumerError,
    message::{InboundMessage, Origin},
    settings::SqsSettings,
    Application,
};

const MAX_MESSAGES: i32 = 10;
const WAIT_TIME_SECONDS: i32 = 20;
const RECEIVE_BACKOFF: Duration = Duration::from_secs(3);

pub struct SqsConsumer<App: Application> {
    client: Client,
    queue_url: String,
    app: Arc<App>,
}

impl<App: Application> SqsConsumer<App> {
    /// Loads AWS configuration from the environment and resolves the queue URL.
    pub async fn new(settings: &SqsSettings, app: Arc<App>) -> Result<Self, ConsumerError> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);

        let output = client
            .get_queue_url()
            .queue_name(&settings.queue_name)
            .send()
            .await
            .map_err(SqsError::from)?;

        let queue_url = output.queue_url.ok_or_else(|| {
            ConsumerError::Fatal(anyhow!(
                "no url returned for queue {}",
                settings.queue_name
            ))
        })?;
        tracing::info!("Queue URL: {}", queue_url);

        Ok(Self {
            client,
            queue_url,
            app,
        })
    }

    pub async fn consume(self) -> Result<(), ConsumerError> {
        loop {
            let received = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(MAX_MESSAGES)
                .wait_time_seconds(WAIT_TIME_SECONDS)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(SqsError::from);

            // Only the queue URL lookup decides between fatal and recoverable;
            // the poll loop keeps going whatever the receive error is.
            let output = match received {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!("Receive error: {}", err);
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                    continue;
                }
            };

            for message in output.messages.unwrap_or_default() {
                self.handle(&message).await?;
            }
        }
    }

    async fn handle(&self, message: &Message) -> Result<(), ConsumerError> {
        let inbound = inbound_message(message);

        loop {
            match self.app.handle_message(&inbound).await {
                Ok(()) => break,
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

        let Some(receipt_handle) = message.receipt_handle() else {
            tracing::warn!("message has no receipt handle, cannot delete it");
            return Ok(());
        };

        if let Err(err) = self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
        {
            tracing::warn!("Delete error: {}", SqsError::from(err));
        }

        Ok(())
    }
}

fn inbound_message(message: &Message) -> InboundMessage {
    let mut attributes = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| {
                    let rendered = match (value.string_value(), value.binary_value()) {
                        (Some(s), _) => s.to_string(),
                        (None, Some(b)) => format!("<{} bytes>", b.as_ref().len()),
                        (None, None) => String::new(),
                    };
                    (name.clone(), rendered)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    attributes.sort();

    InboundMessage {
        origin: Origin::Sqs {
            message_id: message.message_id().unwrap_or_default().to_string(),
        },
        key: None,
        body: message.body().unwrap_or_default().to_string(),
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_sqs::{primitives::Blob, types::MessageAttributeValue};

    use super::*;

    #[test]
    fn attributes_are_sorted_and_rendered() {
        let message = Message::builder()
            .message_id("m-1")
            .body("hello")
            .message_attributes(
                "trace",
                MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value("abc")
                    .build()
                    .unwrap(),
            )
            .message_attributes(
                "blob",
                MessageAttributeValue::builder()
                    .data_type("Binary")
                    .binary_value(Blob::new(vec![1, 2, 3]))
                    .build()
                    .unwrap(),
            )
            .build();

        let inbound = inbound_message(&message);

        assert_eq!(
            inbound.origin,
            Origin::Sqs {
                message_id: "m-1".into()
            }
        );
        assert_eq!(inbound.body, "hello");
        assert_eq!(
            inbound.attributes,
            vec![
                ("blob".to_string(), "<3 bytes>".to_string()),
                ("trace".to_string(), "abc".to_string()),
            ]
        );
    }
}
