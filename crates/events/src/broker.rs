//! Broker abstraction (mechanics only).
//!
//! The rest of the system talks to a partitioned, durable log through two
//! narrow traits: [`BrokerProducer`] appends envelopes and [`BrokerConsumer`]
//! reads them back as part of a consumer group.
//!
//! ## Delivery model
//!
//! - **Partitioned by key**: envelopes with the same key land in the same
//!   partition and are read back in append order.
//! - **At-least-once**: a record is delivered again until its position is
//!   committed. Consumers commit only after handling (or deliberately
//!   skipping) a record.
//! - **Rewind**: a consumer may move a partition back to an uncommitted
//!   record so the next poll delivers it again.
//!
//! Implementations: [`crate::InMemoryBroker`] for tests/dev, and the Kafka
//! adapters in the infra crate for production.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::event::Topic;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker refused the record (e.g. unknown topic, record too large).
    #[error("broker rejected the record: {0}")]
    Rejected(String),

    #[error("broker operation timed out: {0}")]
    Timeout(String),

    /// Temporary failure (connection reset, leader election, ...).
    #[error("transient broker failure: {0}")]
    Transient(String),

    /// The client is unusable (bad credentials, closed connection).
    #[error("fatal broker failure: {0}")]
    Fatal(String),
}

impl BrokerError {
    /// Worth retrying the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Timeout(_) | BrokerError::Transient(_))
    }

    /// The consumer/producer cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::Fatal(_))
    }
}

/// Where a produced envelope was appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub partition: i32,
    pub offset: i64,
}

/// Position of one record in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPosition {
    pub topic: Topic,
    pub partition: i32,
    pub offset: i64,
}

/// A record read from the broker.
#[derive(Debug, Clone)]
pub struct Record {
    pub envelope: Envelope,
    pub position: RecordPosition,
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Append an envelope to its topic.
    ///
    /// Returns once the broker has durably accepted the record.
    async fn produce(&self, envelope: Envelope) -> Result<Delivery, BrokerError>;
}

/// A member of a consumer group.
#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    /// Add a topic to this consumer's subscription. Idempotent.
    fn subscribe(&self, topic: &Topic) -> Result<(), BrokerError>;

    /// Fetch the next batch of records.
    ///
    /// May return an empty batch after an implementation-defined wait.
    /// Must be cancel-safe: dropping the future loses no records.
    async fn poll_batch(&self) -> Result<Vec<Record>, BrokerError>;

    /// Mark everything up to and including `position` as consumed.
    fn commit(&self, position: &RecordPosition) -> Result<(), BrokerError>;

    /// Make the next poll deliver `position` (and what follows it) again.
    fn rewind(&self, position: &RecordPosition) -> Result<(), BrokerError>;
}

#[async_trait]
impl<P> BrokerProducer for Arc<P>
where
    P: BrokerProducer + ?Sized,
{
    async fn produce(&self, envelope: Envelope) -> Result<Delivery, BrokerError> {
        (**self).produce(envelope).await
    }
}

#[async_trait]
impl<C> BrokerConsumer for Arc<C>
where
    C: BrokerConsumer + ?Sized,
{
    fn subscribe(&self, topic: &Topic) -> Result<(), BrokerError> {
        (**self).subscribe(topic)
    }

    async fn poll_batch(&self) -> Result<Vec<Record>, BrokerError> {
        (**self).poll_batch().await
    }

    fn commit(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        (**self).commit(position)
    }

    fn rewind(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        (**self).rewind(position)
    }
}
