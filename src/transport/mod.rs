//! Transport module - endpoint parsing and socket setup.
//!
//! Supported endpoints:
//! - `host:port` - TCP
//! - `unix:/path/to/socket` - Unix Domain Socket (unix targets only)

mod endpoint;

pub use endpoint::{connect, BoxedReader, BoxedWriter, Endpoint};
