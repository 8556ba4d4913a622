use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info, instrument};

use storefront_events::{BrokerError, BrokerProducer, Delivery, Envelope};

use super::{broker_error, client_config};
use crate::config::KafkaConfig;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces envelopes with `acks=all`: a delivery is reported only once
/// every in-sync replica has the record.
pub struct KafkaProducer {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = client_config(config)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", DELIVERY_TIMEOUT.as_millis().to_string())
            .create()
            .map_err(broker_error)?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "kafka producer created"
        );

        Ok(Self {
            producer,
            queue_timeout: DELIVERY_TIMEOUT,
        })
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    #[instrument(skip_all, fields(topic = %envelope.topic(), event_type = envelope.event_type()))]
    async fn produce(&self, envelope: Envelope) -> Result<Delivery, BrokerError> {
        let headers = envelope
            .headers()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key,
                    value: Some(value),
                })
            });

        let record = FutureRecord::to(envelope.topic().as_str())
            .key(envelope.key())
            .payload(envelope.value())
            .headers(headers)
            .timestamp(envelope.timestamp().timestamp_millis());

        let (partition, offset) = self
            .producer
            .send(record, self.queue_timeout)
            .await
            .map_err(|(err, _)| broker_error(err))?;

        debug!(partition, offset, "record acknowledged");
        Ok(Delivery {
            topic: envelope.topic().clone(),
            partition,
            offset,
        })
    }
}
