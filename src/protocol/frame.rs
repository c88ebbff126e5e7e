//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use ordermgmt_client::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(1, flags::RESPONSE, 42, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.call_id(), 42);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// What an inbound server frame means to the call that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A single response message.
    Response,
    /// One item of a server-driven stream.
    StreamItem,
    /// End-of-sequence marker (no payload).
    StreamEnd,
    /// Error status; the call is over.
    Error,
}

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the method ID.
    #[inline]
    pub fn method_id(&self) -> u16 {
        self.header.method_id
    }

    /// Get the flags byte.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    /// Get the call ID.
    #[inline]
    pub fn call_id(&self) -> u32 {
        self.header.call_id
    }

    /// Check if this is a server-to-client frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// Check if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Check if this is a stream item or marker.
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.header.is_stream()
    }

    /// Check if this is an end-of-stream marker.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        self.header.is_stream_end()
    }

    /// Check if this is a cancel signal.
    #[inline]
    pub fn is_cancel(&self) -> bool {
        self.header.is_cancel()
    }

    /// Classify a server frame. Error wins over every other flag.
    pub fn kind(&self) -> FrameKind {
        if self.is_error() {
            FrameKind::Error
        } else if self.is_stream_end() {
            FrameKind::StreamEnd
        } else if self.is_stream() {
            FrameKind::StreamItem
        } else {
            FrameKind::Response
        }
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use ordermgmt_client::protocol::{build_frame, Header, flags};
///
/// let header = Header::new(1, flags::RESPONSE, 42, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), 11 + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_frame_creation() {
        let header = Header::new(1, flags::RESPONSE, 42, 5);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.method_id(), 1);
        assert_eq!(frame.flags(), flags::RESPONSE);
        assert_eq!(frame.call_id(), 42);
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn test_frame_kind() {
        let kind = |f| Frame::new(Header::new(1, f, 1, 0), Bytes::new()).kind();

        assert_eq!(kind(flags::RESPONSE), FrameKind::Response);
        assert_eq!(kind(flags::STREAM_RESPONSE), FrameKind::StreamItem);
        assert_eq!(kind(flags::STREAM_END_RESPONSE), FrameKind::StreamEnd);
        assert_eq!(kind(flags::ERROR_RESPONSE), FrameKind::Error);
        assert_eq!(
            kind(flags::ERROR_RESPONSE | flags::IS_STREAM),
            FrameKind::Error
        );
    }

    #[test]
    fn test_frame_is_cancel() {
        let cancel = Frame::new(Header::cancel(3), Bytes::new());
        assert!(cancel.is_cancel());

        let normal = Frame::new(Header::new(1, 0, 3, 0), Bytes::new());
        assert!(!normal.is_cancel());
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let header = Header::new(1, flags::HALF_CLOSE, 1, 0);
        let bytes = build_frame(&header, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }
}
