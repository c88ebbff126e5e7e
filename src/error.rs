//! Error types for ordermgmt-client.
//!
//! Setup failures ([`RpcError::Connection`]) are fatal to an orchestration
//! run. Everything else is scoped to a single call: the call is abandoned,
//! the failure is reported, and the connection stays usable.

use thiserror::Error;

use crate::status::Status;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The transport handle could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote service rejected or failed the call.
    #[error("Remote error: {0}")]
    Remote(Status),

    /// The caller-supplied deadline expired before the call completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Transport failure while sending on an open stream.
    #[error("Send error: {0}")]
    Send(String),

    /// Transport failure while receiving on an open stream.
    #[error("Receive error: {0}")]
    Receive(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid stream state: {0}")]
    InvalidState(&'static str),

    /// Protocol error (invalid frame, wrong flags, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl RpcError {
    /// Whether this error must abort the whole orchestration run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::Connection(_))
    }

    /// Whether this error is a deadline expiry rather than a remote failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::DeadlineExceeded)
    }

    /// The remote status, if the server reported one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            RpcError::Remote(status) => Some(status),
            _ => None,
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        if status.code() == crate::status::Code::DeadlineExceeded {
            RpcError::DeadlineExceeded
        } else {
            RpcError::Remote(status)
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
