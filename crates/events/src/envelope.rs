use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::event::{Event, Topic};

/// Header carrying the event type tag.
pub const EVENT_TYPE_HEADER: &str = "EventType";

/// Header set on dead-lettered envelopes: why the last attempt failed.
pub const DEAD_LETTER_REASON_HEADER: &str = "DeadLetterReason";

/// Header set on dead-lettered envelopes: how many deliveries were attempted.
pub const DELIVERY_ATTEMPTS_HEADER: &str = "DeliveryAttempts";

/// Wire form of an event: what the broker stores and hands back.
///
/// Notes:
/// - `key` is the subject entity id and selects the partition.
/// - `value` is the variant body only; the variant is named by the
///   `EventType` header.
/// - Unknown headers are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    topic: Topic,
    key: Vec<u8>,
    value: Vec<u8>,
    headers: BTreeMap<String, Vec<u8>>,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(topic: Topic, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            key: key.into(),
            value: value.into(),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Encode an event into an envelope addressed to its topic.
    pub fn from_event(event: &Event) -> Result<Self, serde_json::Error> {
        let value = event.encode()?;
        Ok(Self::new(event.topic(), event.key().as_bytes(), value)
            .with_header(EVENT_TYPE_HEADER, event.event_type().as_str()))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.headers.insert(name.into(), value.as_ref().to_vec());
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy of this envelope addressed to the topic's dead-letter topic.
    ///
    /// Key, body and original headers are preserved so the record can be
    /// replayed onto the source topic unchanged.
    pub fn to_dead_letter(&self, attempts: u32, reason: &str) -> Self {
        let mut dead = self.clone();
        dead.topic = self.topic.dead_letter();
        dead.headers
            .insert(DEAD_LETTER_REASON_HEADER.to_owned(), reason.as_bytes().to_vec());
        dead.headers.insert(
            DELIVERY_ATTEMPTS_HEADER.to_owned(),
            attempts.to_string().into_bytes(),
        );
        dead
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name).map(Vec::as_slice)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `EventType` header as text, if present and valid UTF-8.
    pub fn event_type(&self) -> Option<&str> {
        self.header(EVENT_TYPE_HEADER)
            .and_then(|raw| core::str::from_utf8(raw).ok())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
