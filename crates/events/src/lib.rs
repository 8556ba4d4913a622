//! Event choreography primitives.
//!
//! - [`Event`] and its variants, with topic/type/key metadata
//! - [`DecoderRegistry`]: type tag → decoder, frozen at startup
//! - [`Envelope`]: the wire form of an event
//! - [`BrokerProducer`] / [`BrokerConsumer`] and an [`InMemoryBroker`]
//! - [`EventPublisher`]: acknowledged publish with retries
//! - [`Handler`] and the [`Listener`] that dispatches to handlers
//!
//! Command components validate, check their read model for conflicts, then
//! publish; handlers (possibly in other processes) apply the event to their
//! own store. Nothing is written on the command path itself.

pub mod broker;
pub mod customer;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handler;
pub mod in_memory_broker;
pub mod listener;
pub mod product;
pub mod publisher;
pub mod registry;

pub use broker::{BrokerConsumer, BrokerError, BrokerProducer, Delivery, Record, RecordPosition};
pub use customer::{CustomerCreated, CustomerDeleted, CustomerShippingAddressUpdated};
pub use envelope::{
    DEAD_LETTER_REASON_HEADER, DELIVERY_ATTEMPTS_HEADER, EVENT_TYPE_HEADER, Envelope,
};
pub use error::{CommandError, CommandResult};
pub use event::{CUSTOMERS_TOPIC, Event, EventKey, EventType, EventVariant, PRODUCTS_TOPIC, Topic};
pub use handler::{DeliveryContext, Handler};
pub use in_memory_broker::{InMemoryBroker, InMemoryConsumer};
pub use listener::{
    DispatchPolicy, ListenError, Listener, ListenerConfig, ListenerState, ParsePolicyError,
};
pub use product::{ProductCreated, ProductDeleted, ProductUpdated};
pub use publisher::{EventPublisher, PublishError, Publisher, RetryPolicy};
pub use registry::{DecodeError, DecoderRegistry, DecoderRegistryBuilder, RegistryError};
