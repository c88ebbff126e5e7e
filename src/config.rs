//! Client configuration.
//!
//! [`ClientBuilder`] offers a fluent API over [`ClientConfig`]; the CLI maps
//! its flags onto the builder.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ordermgmt_client::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .endpoint("localhost:50051")
//!     .unwrap()
//!     .call_deadline(Duration::from_secs(2))
//!     .build();
//!
//! assert_eq!(config.call_deadline, Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::transport::Endpoint;
use crate::writer::WriterConfig;

/// Default address of the order service.
pub const DEFAULT_ENDPOINT: &str = "localhost:50051";

/// Default deadline for each call.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(5);

/// Default timeout for establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of each call's inbound frame queue.
pub const DEFAULT_CALL_QUEUE_CAPACITY: usize = 256;

/// Settings for a connection and the calls made on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the remote order service.
    pub endpoint: Endpoint,
    /// Upper bound on establishing the transport.
    pub connect_timeout: Duration,
    /// Deadline applied to each call by the orchestrator.
    pub call_deadline: Duration,
    /// Largest payload accepted from the server.
    pub max_payload_size: u32,
    /// Unread frames buffered per call; a call that falls further behind is reset.
    pub call_queue_capacity: usize,
    /// Outbound writer settings.
    pub writer: WriterConfig,
}

impl ClientConfig {
    /// Create a new config builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp(DEFAULT_ENDPOINT.to_string()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_deadline: DEFAULT_CALL_DEADLINE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            call_queue_capacity: DEFAULT_CALL_QUEUE_CAPACITY,
            writer: WriterConfig::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint from a `host:port` or `unix:/path` string.
    pub fn endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.config.endpoint = endpoint.parse()?;
        Ok(self)
    }

    /// Set an already parsed endpoint.
    pub fn endpoint_addr(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the connect timeout.
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-call deadline.
    ///
    /// Default: 5 seconds
    pub fn call_deadline(mut self, deadline: Duration) -> Self {
        self.config.call_deadline = deadline;
        self
    }

    /// Set the maximum accepted payload size.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the per-call inbound queue capacity.
    ///
    /// Default: 256
    pub fn call_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.call_queue_capacity = capacity.max(1);
        self
    }

    /// Set the maximum pending outbound frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Finish building.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
