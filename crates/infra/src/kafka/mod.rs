//! Kafka adapters for the broker traits (`kafka` feature).
//!
//! - [`KafkaProducer`]: `FutureProducer`, `acks=all`, type tag in the
//!   `EventType` header
//! - [`KafkaConsumer`]: `StreamConsumer` in a consumer group, manual commits,
//!   earliest reset

mod consumer;
mod producer;

pub use consumer::KafkaConsumer;
pub use producer::KafkaProducer;

use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use storefront_events::BrokerError;

use crate::config::KafkaConfig;

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("client.id", &config.client_id);
    client
}

/// Classify a client error for retry decisions.
fn broker_error(err: KafkaError) -> BrokerError {
    use RDKafkaErrorCode as Code;

    let message = err.to_string();
    match err {
        KafkaError::Canceled | KafkaError::ClientCreation(_) | KafkaError::ClientConfig(..) => {
            return BrokerError::Fatal(message);
        }
        _ => {}
    }

    match err.rdkafka_error_code() {
        Some(Code::MessageTimedOut | Code::RequestTimedOut | Code::OperationTimedOut) => {
            BrokerError::Timeout(message)
        }
        Some(
            Code::MessageSizeTooLarge
            | Code::InvalidMessage
            | Code::InvalidMessageSize
            | Code::UnknownTopic
            | Code::UnknownTopicOrPartition
            | Code::TopicAuthorizationFailed
            | Code::InvalidRecord,
        ) => BrokerError::Rejected(message),
        Some(
            Code::Fatal
            | Code::Authentication
            | Code::SaslAuthenticationFailed
            | Code::ClusterAuthorizationFailed,
        ) => BrokerError::Fatal(message),
        _ => BrokerError::Transient(message),
    }
}
