//! In-memory broker for tests/dev.
//!
//! - Partitioned, append-only logs per topic
//! - Consumer groups with committed offsets (earliest reset)
//! - Fault injection for produce and poll
//!
//! No IO, no persistence: the log lives as long as the last clone of the
//! broker handle.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::broker::{BrokerConsumer, BrokerError, BrokerProducer, Delivery, Record, RecordPosition};
use crate::envelope::Envelope;
use crate::event::Topic;

const DEFAULT_PARTITIONS: usize = 3;
const DEFAULT_MAX_BATCH: usize = 64;
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct BrokerState {
    logs: HashMap<Topic, Vec<Vec<Envelope>>>,
    /// Next offset to read, per (group, topic, partition).
    committed: HashMap<(String, Topic, i32), i64>,
    produce_faults: VecDeque<BrokerError>,
    poll_faults: VecDeque<BrokerError>,
}

#[derive(Debug)]
struct Shared {
    partitions: usize,
    state: Mutex<BrokerState>,
    appended: Notify,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Fatal("in-memory broker lock poisoned".into()))
    }

    fn inspect(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to a shared in-memory log.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                appended: Notify::new(),
            }),
        }
    }

    /// New member of consumer group `group`.
    ///
    /// Starts from the group's committed offsets, or from the beginning of
    /// each partition when nothing was committed yet.
    pub fn consumer(&self, group: impl Into<String>) -> InMemoryConsumer {
        InMemoryConsumer {
            group: group.into(),
            shared: Arc::clone(&self.shared),
            cursor: Mutex::new(Cursor::default()),
            max_batch: DEFAULT_MAX_BATCH,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Partition an envelope with this key is appended to.
    pub fn partition_for(&self, key: &[u8]) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shared.partitions as u64) as i32
    }

    /// Every envelope on `topic`, partition by partition.
    pub fn records(&self, topic: &Topic) -> Vec<Envelope> {
        self.shared
            .inspect()
            .logs
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Next offset group `group` will read from `partition`, if it committed.
    pub fn committed_offset(&self, group: &str, topic: &Topic, partition: i32) -> Option<i64> {
        self.shared
            .inspect()
            .committed
            .get(&(group.to_owned(), topic.clone(), partition))
            .copied()
    }

    /// Make the next `produce` fail with `error`.
    pub fn fail_next_produce(&self, error: BrokerError) {
        self.shared.inspect().produce_faults.push_back(error);
    }

    /// Make the next `poll_batch` (on any consumer) fail with `error`.
    pub fn fail_next_poll(&self, error: BrokerError) {
        self.shared.inspect().poll_faults.push_back(error);
    }
}

#[async_trait]
impl BrokerProducer for InMemoryBroker {
    async fn produce(&self, envelope: Envelope) -> Result<Delivery, BrokerError> {
        let partition = self.partition_for(envelope.key());
        let delivery = {
            let mut state = self.shared.state()?;
            if let Some(fault) = state.produce_faults.pop_front() {
                return Err(fault);
            }

            let topic = envelope.topic().clone();
            let partitions = self.shared.partitions;
            let log = state
                .logs
                .entry(topic.clone())
                .or_insert_with(|| vec![Vec::new(); partitions]);
            let slot = &mut log[partition as usize];
            slot.push(envelope);

            Delivery {
                topic,
                partition,
                offset: slot.len() as i64 - 1,
            }
        };

        self.shared.appended.notify_waiters();
        Ok(delivery)
    }
}

#[derive(Debug, Default)]
struct Cursor {
    topics: Vec<Topic>,
    /// Next offset to fetch, per (topic, partition).
    positions: HashMap<(Topic, i32), i64>,
}

/// Consumer-group member reading from an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryConsumer {
    group: String,
    shared: Arc<Shared>,
    cursor: Mutex<Cursor>,
    max_batch: usize,
    poll_timeout: Duration,
}

impl InMemoryConsumer {
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    fn cursor(&self) -> Result<MutexGuard<'_, Cursor>, BrokerError> {
        self.cursor
            .lock()
            .map_err(|_| BrokerError::Fatal("in-memory consumer lock poisoned".into()))
    }

    /// Take whatever is available right now. Never awaits.
    fn take_batch(&self) -> Result<Vec<Record>, BrokerError> {
        let mut cursor = self.cursor()?;
        let mut state = self.shared.state()?;
        if let Some(fault) = state.poll_faults.pop_front() {
            return Err(fault);
        }

        let Cursor { topics, positions } = &mut *cursor;
        let mut batch = Vec::new();
        for topic in topics.iter() {
            let Some(log) = state.logs.get(topic) else {
                continue;
            };
            for (index, partition_log) in log.iter().enumerate() {
                let partition = index as i32;
                let next = positions.entry((topic.clone(), partition)).or_insert_with(|| {
                    state
                        .committed
                        .get(&(self.group.clone(), topic.clone(), partition))
                        .copied()
                        .unwrap_or(0)
                });

                while batch.len() < self.max_batch {
                    let Some(envelope) = partition_log.get(*next as usize) else {
                        break;
                    };
                    batch.push(Record {
                        envelope: envelope.clone(),
                        position: RecordPosition {
                            topic: topic.clone(),
                            partition,
                            offset: *next,
                        },
                    });
                    *next += 1;
                }
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    fn subscribe(&self, topic: &Topic) -> Result<(), BrokerError> {
        let mut cursor = self.cursor()?;
        if !cursor.topics.contains(topic) {
            cursor.topics.push(topic.clone());
        }
        Ok(())
    }

    async fn poll_batch(&self) -> Result<Vec<Record>, BrokerError> {
        // Register interest before looking, so an append between the check
        // and the wait is not missed.
        let appended = self.shared.appended.notified();
        tokio::pin!(appended);
        appended.as_mut().enable();

        let batch = self.take_batch()?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(self.poll_timeout, appended).await;
        self.take_batch()
    }

    fn commit(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        let mut state = self.shared.state()?;
        state.committed.insert(
            (self.group.clone(), position.topic.clone(), position.partition),
            position.offset + 1,
        );
        Ok(())
    }

    fn rewind(&self, position: &RecordPosition) -> Result<(), BrokerError> {
        let mut cursor = self.cursor()?;
        cursor
            .positions
            .insert((position.topic.clone(), position.partition), position.offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PRODUCTS_TOPIC;

    fn envelope(key: &str, body: &str) -> Envelope {
        Envelope::new(PRODUCTS_TOPIC, key.as_bytes(), body.as_bytes())
    }

    #[tokio::test]
    async fn same_key_lands_in_one_partition_in_order() {
        let broker = InMemoryBroker::new();
        let a = broker.produce(envelope("p1", "1")).await.unwrap();
        let b = broker.produce(envelope("p1", "2")).await.unwrap();

        assert_eq!(a.partition, b.partition);
        assert_eq!(b.offset, a.offset + 1);
        assert_eq!(a.partition, broker.partition_for(b"p1"));
    }

    #[tokio::test]
    async fn uncommitted_records_are_delivered_to_the_next_group_member() {
        let broker = InMemoryBroker::new();
        broker.produce(envelope("p1", "1")).await.unwrap();
        broker.produce(envelope("p1", "2")).await.unwrap();

        let first = broker.consumer("g");
        first.subscribe(&PRODUCTS_TOPIC).unwrap();
        let batch = first.poll_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        first.commit(&batch[0].position).unwrap();
        drop(first);

        let second = broker.consumer("g");
        second.subscribe(&PRODUCTS_TOPIC).unwrap();
        let batch = second.poll_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].envelope.value(), b"2");
    }

    #[tokio::test]
    async fn rewind_redelivers_from_the_given_offset() {
        let broker = InMemoryBroker::new();
        broker.produce(envelope("p1", "1")).await.unwrap();

        let consumer = broker.consumer("g");
        consumer.subscribe(&PRODUCTS_TOPIC).unwrap();
        let batch = consumer.poll_batch().await.unwrap();
        consumer.rewind(&batch[0].position).unwrap();

        let again = consumer.poll_batch().await.unwrap();
        assert_eq!(again[0].position, batch[0].position);
    }

    #[tokio::test]
    async fn batch_size_is_capped() {
        let broker = InMemoryBroker::new();
        for amount in ["1", "2", "3"] {
            broker.produce(envelope("p1", amount)).await.unwrap();
        }
        let consumer = broker.consumer("g").with_max_batch(2);
        consumer.subscribe(&PRODUCTS_TOPIC).unwrap();

        let first = consumer.poll_batch().await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = consumer.poll_batch().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].position.offset, 2);
    }

    #[tokio::test]
    async fn poll_wakes_up_on_append() {
        let broker = InMemoryBroker::new();
        let consumer = broker
            .consumer("g")
            .with_poll_timeout(Duration::from_secs(5));
        consumer.subscribe(&PRODUCTS_TOPIC).unwrap();

        let producer = broker.clone();
        let produce = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.produce(envelope("p1", "1")).await.unwrap();
        });

        let batch = tokio::time::timeout(Duration::from_secs(1), consumer.poll_batch())
            .await
            .expect("poll should wake up before its own timeout")
            .unwrap();
        assert_eq!(batch.len(), 1);
        produce.await.unwrap();
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let broker = InMemoryBroker::new();
        broker.fail_next_produce(BrokerError::Timeout("slow".into()));

        assert!(broker.produce(envelope("p1", "1")).await.is_err());
        assert!(broker.produce(envelope("p1", "1")).await.is_ok());
    }
}
