use aws_sdk_sqs::Error as SqsError;
use rdkafka::error::KafkaError;

#[derive(Debug)]
pub enum ConsumerError {
    Recoverable(anyhow::Error),
    Fatal(anyhow::Error),
}

pub trait ErrorExt {
    fn is_recoverable(&self) -> bool;
}

impl<E: ErrorExt + Into<anyhow::Error>> From<E> for ConsumerError {
    fn from(err: E) -> Self {
        if err.is_recoverable() {
            Self::Recoverable(err.into())
        } else {
            Self::Fatal(err.into())
        }
    }
}

impl ErrorExt for KafkaError {
    fn is_recoverable(&self) -> bool {
        use KafkaError::*;

        match self {
            ClientCreation(..) | ClientConfig(..) | Subscription(..) => false,
            _ => true,
        }
    }
}

impl ErrorExt for SqsError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, SqsError::QueueDoesNotExist(..))
    }
}

impl std::fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recoverable(err) => write!(f, "recoverable: {err}"),
            Self::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_sqs::types::error::{OverLimit, QueueDoesNotExist};
    use rdkafka::error::RDKafkaErrorCode;

    use super::*;

    #[test]
    fn client_creation_errors_are_fatal() {
        let err = KafkaError::ClientCreation("invalid bootstrap.servers".into());
        assert!(matches!(ConsumerError::from(err), ConsumerError::Fatal(_)));
    }

    #[test]
    fn broker_errors_are_recoverable() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(matches!(
            ConsumerError::from(err),
            ConsumerError::Recoverable(_)
        ));
    }

    #[test]
    fn missing_queue_is_fatal() {
        let err = SqsError::QueueDoesNotExist(QueueDoesNotExist::builder().message("gone").build());
        assert!(matches!(ConsumerError::from(err), ConsumerError::Fatal(_)));
    }

    #[test]
    fn other_sqs_errors_are_recoverable() {
        let err = SqsError::OverLimit(OverLimit::builder().build());
        assert!(matches!(
            ConsumerError::from(err),
            ConsumerError::Recoverable(_)
        ));
    }
}
