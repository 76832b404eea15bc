// src/props/mod.rs

//! Moving property values between a program and the engine.
//!
//! - `wire` holds the reserved sentinels of the JSON wire format.
//! - `serialize` turns [`InputValue`](crate::value::InputValue)s into wire
//!   JSON, awaiting every deferred piece and collecting the resources each
//!   property depends on.
//! - `deserialize` turns engine responses back into
//!   [`PropertyValue`](crate::value::PropertyValue)s.
//! - `transfer` allocates one pending cell per declared output property and
//!   settles them from a response.

pub mod deserialize;
pub mod serialize;
pub mod transfer;
pub mod wire;

pub use deserialize::{deserialize_properties, deserialize_property};
pub use serialize::{
    SerializedProperties, encode_plain, serialize_properties, serialize_property,
    serialize_resource_properties,
};
pub use transfer::{
    PropertyResolvers, ResourceOutputs, resolve_properties, settle_unknown, transfer_properties,
};
pub use wire::WireOptions;
