use std::borrow::{Borrow, Cow};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::customer::{CustomerCreated, CustomerDeleted, CustomerShippingAddressUpdated};
use crate::product::{ProductCreated, ProductDeleted, ProductUpdated};

macro_rules! impl_name_newtype {
    ($t:ident) => {
        impl $t {
            pub const fn from_static(name: &'static str) -> Self {
                Self(Cow::Borrowed(name))
            }

            pub fn new(name: impl Into<String>) -> Self {
                Self(Cow::Owned(name.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $t {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

/// Logical event stream for one entity family (e.g. `"Products"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Cow<'static, str>);

/// Tag identifying a concrete event variant (e.g. `"Product.Created"`).
///
/// Type tags are globally unique across topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(Cow<'static, str>);

impl_name_newtype!(Topic);
impl_name_newtype!(EventType);

impl Topic {
    /// Topic that receives envelopes which kept failing on this topic.
    pub fn dead_letter(&self) -> Topic {
        Topic::new(format!("{}.dead-letter", self.0))
    }
}

pub const PRODUCTS_TOPIC: Topic = Topic::from_static("Products");
pub const CUSTOMERS_TOPIC: Topic = Topic::from_static("Customers");

/// Partition key: the subject entity's id.
///
/// Every event about one entity carries the same key, so the broker keeps
/// them in one partition and delivers them in publish order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl core::fmt::Display for EventKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete event variant, as it travels on the wire.
///
/// The body is serialized on its own (no enum tag); the variant is identified
/// by the `EventType` header of the envelope instead.
pub trait EventVariant:
    Serialize + DeserializeOwned + Into<Event> + Clone + core::fmt::Debug + Send + Sync + 'static
{
    /// Topic every event of this variant is published to.
    const TOPIC: Topic;

    /// Globally unique type tag.
    const EVENT_TYPE: EventType;

    /// Partition key, derived from the subject entity's id.
    fn key(&self) -> EventKey;
}

macro_rules! event_variants {
    ($($variant:ident),+ $(,)?) => {
        /// A domain event: an immutable fact that already happened.
        ///
        /// Closed set of every variant this system publishes. `topic()`,
        /// `event_type()` and `key()` are pure accessors.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $($variant($variant),)+
        }

        impl Event {
            pub fn topic(&self) -> Topic {
                match self {
                    $(Event::$variant(_) => <$variant as EventVariant>::TOPIC,)+
                }
            }

            pub fn event_type(&self) -> EventType {
                match self {
                    $(Event::$variant(_) => <$variant as EventVariant>::EVENT_TYPE,)+
                }
            }

            pub fn key(&self) -> EventKey {
                match self {
                    $(Event::$variant(e) => e.key(),)+
                }
            }

            /// Serialize the variant body (what goes into the envelope value).
            pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
                match self {
                    $(Event::$variant(e) => serde_json::to_vec(e),)+
                }
            }
        }

        $(
            impl From<$variant> for Event {
                fn from(value: $variant) -> Self {
                    Event::$variant(value)
                }
            }
        )+
    };
}

event_variants!(
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    CustomerCreated,
    CustomerShippingAddressUpdated,
    CustomerDeleted,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_and_type_compare_by_content() {
        assert_eq!(Topic::new("Products"), PRODUCTS_TOPIC);
        assert_eq!(EventType::from("Product.Created"), ProductCreated::EVENT_TYPE);
        assert_ne!(PRODUCTS_TOPIC, CUSTOMERS_TOPIC);
    }

    #[test]
    fn dead_letter_topic_is_derived_from_source_topic() {
        assert_eq!(PRODUCTS_TOPIC.dead_letter().as_str(), "Products.dead-letter");
    }

    #[test]
    fn accessors_are_derived_from_variant() {
        let event: Event = ProductDeleted {
            product_id: "p1".into(),
        }
        .into();

        assert_eq!(event.topic(), PRODUCTS_TOPIC);
        assert_eq!(event.event_type().as_str(), "Product.Deleted");
        assert_eq!(event.key().as_bytes(), b"p1");
    }

    #[test]
    fn encode_writes_only_the_variant_body() {
        let event: Event = CustomerDeleted {
            customer_id: "c1".into(),
        }
        .into();

        let body: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "customer_id": "c1" }));
    }
}
