//! Publishing events to the broker.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::broker::{BrokerError, BrokerProducer};
use crate::envelope::Envelope;
use crate::event::Event;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode {event_type}: {source}")]
    Serialization {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish {event_type} to {topic} after {attempts} attempt(s): {source}")]
    Broker {
        topic: String,
        event_type: String,
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}

/// Publishes domain events.
///
/// `publish` returns `Ok` only once the broker acknowledged the event; the
/// caller may treat the event as part of the log from then on.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), PublishError>;
}

#[async_trait]
impl<P> Publisher for std::sync::Arc<P>
where
    P: Publisher + ?Sized,
{
    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}

/// How many times a transient produce failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// [`Publisher`] over a [`BrokerProducer`].
///
/// Encodes the event into an [`Envelope`] (key = subject id, `EventType`
/// header = type tag) and produces it. Timeouts and transient failures are
/// retried per [`RetryPolicy`]; rejections and fatal failures are returned
/// immediately.
#[derive(Debug, Clone)]
pub struct EventPublisher<P> {
    producer: P,
    retry: RetryPolicy,
}

impl<P: BrokerProducer> EventPublisher<P> {
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl<P: BrokerProducer> Publisher for EventPublisher<P> {
    #[instrument(
        skip(self, event),
        fields(topic = %event.topic(), event_type = %event.event_type(), key = %event.key()),
        err
    )]
    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let envelope = Envelope::from_event(event).map_err(|source| PublishError::Serialization {
            event_type: event.event_type().to_string(),
            source,
        })?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.producer.produce(envelope.clone()).await {
                Ok(delivery) => {
                    tracing::debug!(
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "event published"
                    );
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "publish failed, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(PublishError::Broker {
                        topic: event.topic().to_string(),
                        event_type: event.event_type().to_string(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}
