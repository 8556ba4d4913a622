//! Listener: owns topic subscriptions, polls the broker and dispatches
//! decoded events to every handler registered for their topic.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──handle()──▶ Subscribed ──listen()──▶ Running ──cancel / fatal──▶ Draining ──▶ Stopped
//! ```
//!
//! `listen` stops polling as soon as its token is cancelled, but only returns
//! once every handler invocation already started has completed. There is no
//! per-handler timeout: a hung handler delays shutdown.
//!
//! ## Dispatch policies
//!
//! - [`DispatchPolicy::Ordered`] (default): records are handled one at a time
//!   and a record's offset is committed only after all its handlers
//!   succeeded. Events sharing a key reach handlers in publish order. A
//!   failed record is rewound and redelivered (to *all* handlers of its
//!   topic) after `redelivery_backoff`; later records of the same partition
//!   wait behind it.
//! - [`DispatchPolicy::Concurrent`]: every handler invocation runs on its own
//!   task and offsets are committed as soon as the work is dispatched.
//!   Throughput is higher, but **same-key ordering is not preserved** once
//!   handler latency varies, and failed invocations are logged, not
//!   redelivered.
//!
//! Under both policies, envelopes that cannot be decoded and events for a
//! topic without handlers are logged and committed; they never stall a
//! partition. A handler that panics counts as a failed invocation.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerConsumer, BrokerError, BrokerProducer, Record, RecordPosition};
use crate::event::{Event, Topic};
use crate::handler::{DeliveryContext, Handler, HandlerTable};
use crate::registry::DecoderRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchPolicy {
    #[default]
    Ordered,
    Concurrent,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown dispatch policy: {0} (expected `ordered` or `concurrent`)")]
pub struct ParsePolicyError(String);

impl FromStr for DispatchPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" => Ok(DispatchPolicy::Ordered),
            "concurrent" => Ok(DispatchPolicy::Concurrent),
            other => Err(ParsePolicyError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub policy: DispatchPolicy,
    /// Pause before a failed record is redelivered, and after a transient
    /// poll error.
    pub redelivery_backoff: Duration,
    /// Dead-letter a record after this many failed deliveries (Ordered only,
    /// requires a dead-letter producer).
    pub dead_letter_after: Option<u32>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::Ordered,
            redelivery_backoff: Duration::from_millis(100),
            dead_letter_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Idle = 0,
    Subscribed = 1,
    Running = 2,
    Draining = 3,
    Stopped = 4,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Idle,
            1 => ListenerState::Subscribed,
            2 => ListenerState::Running,
            3 => ListenerState::Draining,
            _ => ListenerState::Stopped,
        }
    }
}

#[derive(Debug, Error)]
pub enum ListenError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("listener is already running")]
    AlreadyRunning,
}

/// What happened to one record under the ordered policy.
enum Outcome {
    Done,
    Redeliver,
}

pub struct Listener<C> {
    consumer: C,
    registry: Arc<DecoderRegistry>,
    handlers: HandlerTable,
    config: ListenerConfig,
    dead_letter: Option<Arc<dyn BrokerProducer>>,
    state: AtomicU8,
    tracker: TaskTracker,
}

impl<C: BrokerConsumer> Listener<C> {
    pub fn new(consumer: C, registry: Arc<DecoderRegistry>) -> Self {
        Self {
            consumer,
            registry,
            handlers: HandlerTable::default(),
            config: ListenerConfig::default(),
            dead_letter: None,
            state: AtomicU8::new(ListenerState::Idle as u8),
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Producer used to move poison records to `<topic>.dead-letter`.
    pub fn with_dead_letter(mut self, producer: Arc<dyn BrokerProducer>) -> Self {
        self.dead_letter = Some(producer);
        self
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Topics with at least one handler.
    pub fn topics(&self) -> Vec<Topic> {
        self.handlers.topics()
    }

    /// Register `handler` for `topic`.
    ///
    /// The first registration for a topic subscribes the consumer to it;
    /// further registrations append to the topic's handler set. May be
    /// called while the listener is running.
    pub fn handle<H: Handler>(&self, topic: Topic, handler: H) -> Result<(), ListenError> {
        self.handle_shared(topic, Arc::new(handler))
    }

    pub fn handle_shared(&self, topic: Topic, handler: Arc<dyn Handler>) -> Result<(), ListenError> {
        self.handlers.register(&self.consumer, topic.clone(), handler)?;
        let _ = self.state.compare_exchange(
            ListenerState::Idle as u8,
            ListenerState::Subscribed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        debug!(%topic, "handler registered");
        Ok(())
    }

    /// Poll and dispatch until `shutdown` is cancelled or the broker fails
    /// fatally.
    ///
    /// Returns `Ok(())` on cancellation and the broker error otherwise; in
    /// both cases only after in-flight handler invocations finished.
    pub async fn listen(&self, shutdown: CancellationToken) -> Result<(), ListenError> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ListenerState::from_u8(current) {
                    ListenerState::Running | ListenerState::Draining => None,
                    _ => Some(ListenerState::Running as u8),
                }
            })
            .map_err(|_| ListenError::AlreadyRunning)?;
        self.tracker.reopen();

        info!(policy = ?self.config.policy, topics = ?self.topics(), "listener started");

        let mut attempts: HashMap<RecordPosition, u32> = HashMap::new();
        let result = loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                polled = self.consumer.poll_batch() => polled,
            };

            let batch = match polled {
                Ok(batch) => batch,
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "broker failed, stopping listener");
                    break Err(ListenError::Broker(err));
                }
                Err(err) => {
                    warn!(error = %err, "poll failed, retrying");
                    self.pause(&shutdown).await;
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            let dispatched = match self.config.policy {
                DispatchPolicy::Ordered => self.dispatch_ordered(batch, &mut attempts, &shutdown).await,
                DispatchPolicy::Concurrent => self.dispatch_concurrent(batch, &shutdown),
            };
            match dispatched {
                Ok(true) => self.pause(&shutdown).await,
                Ok(false) => {}
                Err(err) => {
                    error!(error = %err, "broker failed, stopping listener");
                    break Err(ListenError::Broker(err));
                }
            }
        };

        self.state.store(ListenerState::Draining as u8, Ordering::Release);
        self.tracker.close();
        self.tracker.wait().await;
        self.state.store(ListenerState::Stopped as u8, Ordering::Release);
        info!("listener stopped");

        result
    }

    /// Handle a batch record by record. Returns whether a partition stalled
    /// on a failed record.
    async fn dispatch_ordered(
        &self,
        batch: Vec<Record>,
        attempts: &mut HashMap<RecordPosition, u32>,
        shutdown: &CancellationToken,
    ) -> Result<bool, BrokerError> {
        let mut halted: HashSet<(Topic, i32)> = HashSet::new();
        let mut stalled = false;

        for record in batch {
            let partition = (record.position.topic.clone(), record.position.partition);
            if halted.contains(&partition) {
                continue;
            }
            // Stop between records; what was not handled is fetched again.
            if shutdown.is_cancelled() {
                self.rewind(&record.position)?;
                halted.insert(partition);
                continue;
            }

            match self.deliver(&record, attempts).await? {
                Outcome::Done => {}
                Outcome::Redeliver => {
                    self.rewind(&record.position)?;
                    halted.insert(partition);
                    stalled = true;
                }
            }
        }

        Ok(stalled)
    }

    async fn deliver(
        &self,
        record: &Record,
        attempts: &mut HashMap<RecordPosition, u32>,
    ) -> Result<Outcome, BrokerError> {
        let Some((event, handlers)) = self.prepare(record)? else {
            return Ok(Outcome::Done);
        };

        let attempt = attempts.get(&record.position).copied().unwrap_or(0) + 1;
        let ctx = DeliveryContext::new(&record.position, attempt);

        let mut failure: Option<anyhow::Error> = None;
        for handler in &handlers {
            if let Err(err) = invoke(handler.as_ref(), &event, &ctx).await {
                log_handler_failure(&event, &ctx, &err);
                failure.get_or_insert(err);
            }
        }

        let Some(err) = failure else {
            attempts.remove(&record.position);
            self.commit(&record.position)?;
            return Ok(Outcome::Done);
        };

        if self.dead_letter_due(attempt) && self.send_to_dead_letter(record, attempt, &err).await {
            attempts.remove(&record.position);
            self.commit(&record.position)?;
            return Ok(Outcome::Done);
        }

        attempts.insert(record.position.clone(), attempt);
        Ok(Outcome::Redeliver)
    }

    /// Spawn every handler invocation of the batch and commit eagerly.
    fn dispatch_concurrent(
        &self,
        batch: Vec<Record>,
        shutdown: &CancellationToken,
    ) -> Result<bool, BrokerError> {
        let mut halted: HashSet<(Topic, i32)> = HashSet::new();

        for record in batch {
            let partition = (record.position.topic.clone(), record.position.partition);
            if halted.contains(&partition) {
                continue;
            }
            if shutdown.is_cancelled() {
                self.rewind(&record.position)?;
                halted.insert(partition);
                continue;
            }

            let Some((event, handlers)) = self.prepare(&record)? else {
                continue;
            };

            let event = Arc::new(event);
            let ctx = DeliveryContext::new(&record.position, 1);
            for handler in handlers {
                let event = Arc::clone(&event);
                let ctx = ctx.clone();
                self.tracker.spawn(async move {
                    if let Err(err) = invoke(handler.as_ref(), &event, &ctx).await {
                        log_handler_failure(&event, &ctx, &err);
                    }
                });
            }
            self.commit(&record.position)?;
        }

        Ok(false)
    }

    /// Decode a record and look up its handlers. Records that cannot be
    /// dispatched are committed and yield `None`.
    fn prepare(&self, record: &Record) -> Result<Option<(Event, Vec<Arc<dyn Handler>>)>, BrokerError> {
        let position = &record.position;
        let event = match self.registry.decode_envelope(&record.envelope) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    topic = %position.topic,
                    partition = position.partition,
                    offset = position.offset,
                    event_type = record.envelope.event_type().unwrap_or("<none>"),
                    error = %err,
                    "skipping undecodable envelope"
                );
                self.commit(position)?;
                return Ok(None);
            }
        };

        let handlers = self.handlers.handlers_for(&event.topic());
        if handlers.is_empty() {
            debug!(topic = %event.topic(), event_type = %event.event_type(), "no handlers registered, skipping");
            self.commit(position)?;
            return Ok(None);
        }

        Ok(Some((event, handlers)))
    }

    fn dead_letter_due(&self, attempt: u32) -> bool {
        self.dead_letter.is_some()
            && self
                .config
                .dead_letter_after
                .is_some_and(|limit| attempt >= limit)
    }

    async fn send_to_dead_letter(&self, record: &Record, attempt: u32, err: &anyhow::Error) -> bool {
        let Some(producer) = &self.dead_letter else {
            return false;
        };

        let dead = record.envelope.to_dead_letter(attempt, &format!("{err:#}"));
        match producer.produce(dead).await {
            Ok(delivery) => {
                warn!(
                    topic = %record.position.topic,
                    offset = record.position.offset,
                    dead_letter_topic = %delivery.topic,
                    attempts = attempt,
                    "record moved to dead-letter topic"
                );
                true
            }
            Err(produce_err) => {
                error!(
                    topic = %record.position.topic,
                    offset = record.position.offset,
                    error = %produce_err,
                    "dead-lettering failed, record will be redelivered"
                );
                false
            }
        }
    }

    /// Commit, tolerating non-fatal failures (the record is then redelivered
    /// to the next group member, which handlers must tolerate anyway).
    fn commit(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        match self.consumer.commit(position) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(topic = %position.topic, offset = position.offset, error = %err, "commit failed");
                Ok(())
            }
        }
    }

    fn rewind(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        match self.consumer.rewind(position) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(topic = %position.topic, offset = position.offset, error = %err, "rewind failed");
                Ok(())
            }
        }
    }

    async fn pause(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.redelivery_backoff) => {}
        }
    }
}

/// Run one handler invocation, reporting a panic as an error.
async fn invoke(handler: &dyn Handler, event: &Event, ctx: &DeliveryContext) -> anyhow::Result<()> {
    match AssertUnwindSafe(handler.handle(event, ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("handler panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

fn log_handler_failure(event: &Event, ctx: &DeliveryContext, err: &anyhow::Error) {
    error!(
        event_type = %event.event_type(),
        key = %event.key(),
        topic = %ctx.topic,
        partition = ctx.partition,
        offset = ctx.offset,
        attempt = ctx.attempt,
        error = %format_args!("{err:#}"),
        "handler failed"
    );
}
