use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers};
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use storefront_events::{BrokerConsumer, BrokerError, Envelope, Record, RecordPosition, Topic};

use super::{broker_error, client_config};
use crate::config::KafkaConfig;

const MAX_BATCH: usize = 64;
const POLL_TIMEOUT: Duration = Duration::from_millis(500);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer group member with manual, synchronous offset commits.
///
/// Offsets are never auto-committed; the listener commits each record after
/// its handlers are done.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Mutex<BTreeSet<String>>,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = client_config(config)
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()
            .map_err(broker_error)?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            group = %config.consumer_group,
            "kafka consumer created"
        );

        Ok(Self {
            consumer,
            topics: Mutex::new(BTreeSet::new()),
        })
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    let topic = Topic::new(message.topic());
    let mut envelope = Envelope::new(
        topic.clone(),
        message.key().unwrap_or_default(),
        message.payload().unwrap_or_default(),
    );
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            if let Some(value) = header.value {
                envelope = envelope.with_header(header.key, value);
            }
        }
    }
    if let Some(timestamp) = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    {
        envelope = envelope.with_timestamp(timestamp);
    }

    Record {
        envelope,
        position: RecordPosition {
            topic,
            partition: message.partition(),
            offset: message.offset(),
        },
    }
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    /// Kafka replaces the subscription on every call, so the full set is
    /// resubscribed each time a topic is added.
    fn subscribe(&self, topic: &Topic) -> Result<(), BrokerError> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| BrokerError::Fatal("subscription lock poisoned".into()))?;
        if !topics.insert(topic.as_str().to_owned()) {
            return Ok(());
        }

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&names).map_err(broker_error)?;
        info!(topics = ?names, "subscribed");
        Ok(())
    }

    /// Waits up to the poll timeout for the first record, then takes whatever
    /// else is already buffered without waiting again. Cancelling the wait
    /// loses nothing.
    async fn poll_batch(&self) -> Result<Vec<Record>, BrokerError> {
        let first = match tokio::time::timeout(POLL_TIMEOUT, self.consumer.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(received) => received.map_err(broker_error)?,
        };

        let mut batch = vec![to_record(&first)];
        while batch.len() < MAX_BATCH {
            match self.consumer.recv().now_or_never() {
                Some(Ok(message)) => batch.push(to_record(&message)),
                Some(Err(err)) => {
                    warn!(error = %err, "stopping batch early");
                    break;
                }
                None => break,
            }
        }
        debug!(records = batch.len(), "polled batch");
        Ok(batch)
    }

    fn commit(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                position.topic.as_str(),
                position.partition,
                Offset::Offset(position.offset + 1),
            )
            .map_err(broker_error)?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(broker_error)
    }

    fn rewind(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        self.consumer
            .seek(
                position.topic.as_str(),
                position.partition,
                Offset::Offset(position.offset),
                SEEK_TIMEOUT,
            )
            .map_err(broker_error)
    }
}
