//! Handler contract and the topic → handlers table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::broker::{BrokerConsumer, BrokerError, RecordPosition};
use crate::event::{Event, Topic};

/// Where the event being handled came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    pub topic: Topic,
    pub partition: i32,
    pub offset: i64,
    /// 1 on first delivery, incremented on every redelivery of this record.
    pub attempt: u32,
}

impl DeliveryContext {
    pub fn new(position: &RecordPosition, attempt: u32) -> Self {
        Self {
            topic: position.topic.clone(),
            partition: position.partition,
            offset: position.offset,
            attempt,
        }
    }

    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Reacts to events of one topic.
///
/// ## Contract
///
/// - Receives every event published to the topic it was registered for,
///   including variants it does not care about (ignore them with `Ok(())`).
/// - Must be **idempotent**: delivery is at-least-once and a failed event is
///   delivered again, to every handler of its topic.
/// - Returning `Err` requests redelivery (under the ordered policy); the
///   error is logged with the event's type, key and position.
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Handler for Audit {
///     async fn handle(&self, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()> {
///         tracing::info!(event_type = %event.event_type(), offset = ctx.offset, "seen");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()> {
        (**self).handle(event, ctx).await
    }
}

/// Topic → handlers, safe to mutate while dispatch is reading it.
#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: RwLock<HashMap<Topic, Vec<Arc<dyn Handler>>>>,
}

impl HandlerTable {
    /// Append a handler. The consumer is subscribed to `topic` the first time
    /// a handler is registered for it, and only then.
    pub(crate) fn register<C: BrokerConsumer>(
        &self,
        consumer: &C,
        topic: Topic,
        handler: Arc<dyn Handler>,
    ) -> Result<(), BrokerError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.get_mut(&topic) {
            Some(list) => list.push(handler),
            None => {
                consumer.subscribe(&topic)?;
                handlers.insert(topic, vec![handler]);
            }
        }
        Ok(())
    }

    /// Snapshot of the handlers for `topic`, in registration order.
    pub(crate) fn handlers_for(&self, topic: &Topic) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn topics(&self) -> Vec<Topic> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
