//! # ordermgmt-client
//!
//! Async client for an order-management RPC service, covering all four
//! interaction shapes:
//!
//! - **Unary** ([`Connection::unary`]): one request, one response
//! - **Server stream** ([`Connection::server_stream`]): one request, a lazy
//!   sequence of responses
//! - **Client stream** ([`Connection::client_stream`]): a sequence of
//!   requests, one aggregate response
//! - **Bidirectional** ([`Connection::bidi`], [`BidiCoordinator`]): both
//!   directions active at once, reconciled through a rendezvous before the
//!   call completes
//!
//! ## Architecture
//!
//! One [`Connection`] multiplexes every call over a single byte stream. A
//! writer task batches outbound frames; a read loop routes inbound frames to
//! calls by call id. Payloads are MessagePack.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ordermgmt_client::{ClientConfig, Orchestrator, TracingReporter};
//!
//! #[tokio::main]
//! async fn main() -> ordermgmt_client::Result<()> {
//!     let orchestrator =
//!         Orchestrator::connect(&ClientConfig::default(), Arc::new(TracingReporter)).await?;
//!     let report = orchestrator.run().await;
//!     assert!(report.all_succeeded());
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod codec;
pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod protocol;
pub mod service;
pub mod status;
pub mod transport;

mod backpressure;
mod connection;
mod writer;

pub use call::bidi::{
    BidiCoordinator, BidiReceiver, BidiSender, BidiState, BidiStream, BidiSummary,
    ConsumerHandle, ConsumerReport,
};
pub use call::client_stream::ClientStream;
pub use call::server_stream::ServerStream;
pub use config::{ClientBuilder, ClientConfig};
pub use connection::Connection;
pub use error::{Result, RpcError};
pub use observer::{DiscardObserver, Reporter, StreamObserver, TracingObserver, TracingReporter};
pub use orchestrator::{CallRecord, Orchestrator, RunReport, Scenario};
pub use service::{CombinedShipment, Order, OrderManagementClient};
pub use status::{Code, Status};
pub use transport::Endpoint;
pub use writer::WriterConfig;
