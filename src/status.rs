//! Remote call status carried by error frames.
//!
//! An `ERROR_RESPONSE` frame's payload is a MsgPack-encoded [`Status`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status codes a remote service may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// Not an error.
    Ok,
    /// The call was cancelled, typically by the caller.
    Cancelled,
    /// The request payload was rejected.
    InvalidArgument,
    /// The deadline expired on the remote side.
    DeadlineExceeded,
    /// A requested entity was not found.
    NotFound,
    /// The entity being created already exists.
    AlreadyExists,
    /// Internal failure in the remote service.
    Internal,
    /// The remote service is temporarily unavailable.
    Unavailable,
    /// The method is not implemented by the remote service.
    Unimplemented,
    /// Any other failure.
    Unknown,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Call status returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a new status.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Shorthand for an `InvalidArgument` status.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Shorthand for an `Internal` status.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// The status code.
    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    /// The human-readable message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}
