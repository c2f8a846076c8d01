use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{error::ConsumerError, Application};

/// A message pulled off either broker, reduced to what the demo apps log.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: Origin,
    pub key: Option<String>,
    pub body: String,
    /// Kafka headers or SQS message attributes, in delivery order.
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Kafka {
        topic: String,
        partition: i32,
        offset: i64,
        timestamp: Option<DateTime<Utc>>,
    },
    Sqs {
        message_id: String,
    },
}

/// Application that writes every received message to the log.
pub struct MessageLogger;

impl MessageLogger {
    pub fn describe(message: &InboundMessage) -> Vec<String> {
        let mut lines = vec!["=== Message Received ===".to_string()];

        match &message.origin {
            Origin::Kafka {
                topic,
                partition,
                offset,
                ..
            } => {
                lines.push(format!("Topic: {topic}"));
                lines.push(format!("Partition: {partition}"));
                lines.push(format!("Offset: {offset}"));
                lines.push(format!("Key: {}", message.key.as_deref().unwrap_or("")));
                lines.push(format!("Value: {}", message.body));
            }
            Origin::Sqs { message_id } => {
                lines.push(format!("ID: {message_id}"));
                lines.push(format!("Body: {}", message.body));
            }
        }

        if let Origin::Kafka {
            timestamp: Some(ts),
            ..
        } = &message.origin
        {
            lines.push(format!(
                "Timestamp: {}",
                ts.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        if !message.attributes.is_empty() {
            lines.push(match message.origin {
                Origin::Kafka { .. } => "Headers:".to_string(),
                Origin::Sqs { .. } => "Attributes:".to_string(),
            });
            for (key, value) in &message.attributes {
                lines.push(format!("  {key}: {value}"));
            }
        }

        lines
    }
}

#[async_trait]
impl Application for MessageLogger {
    async fn handle_message(&self, message: &InboundMessage) -> Result<(), ConsumerError> {
        for line in Self::describe(message) {
            tracing::info!("{}", line);
        }
        Ok(())
    }
}
