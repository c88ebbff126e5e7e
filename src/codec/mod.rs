//! Codec module - payload serialization.
//!
//! Payloads are opaque to the call machinery: any `Serialize` request and
//! any `DeserializeOwned` response can ride a call. [`MsgPackCodec`] turns
//! them into frame payloads.

mod msgpack;

pub use msgpack::MsgPackCodec;
