//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; a
/// customer's shipping address is one. To "change" a value object, replace it
/// with a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct ShippingAddress { country: String, city: String, zip_code: String, street: String }
///
/// impl ValueObject for ShippingAddress {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
