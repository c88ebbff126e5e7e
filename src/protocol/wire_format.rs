//! Wire format encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Method ID│ Flags │ Call ID  │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{Result, RpcError};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved method ID for cancelling a call.
pub const CANCEL_METHOD_ID: u16 = 0xFFFF;

/// Reserved method ID (never use).
pub const RESERVED_METHOD_ID: u16 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// Message direction: server to client (1) or client to server (0).
    pub const IS_RESPONSE: u8 = 0b0000_0001;
    /// Error flag: payload is a `Status` (1) or a message (0).
    pub const IS_ERROR: u8 = 0b0000_0010;
    /// Stream flag: item of a stream (1) or single message (0).
    pub const IS_STREAM: u8 = 0b0000_0100;
    /// Stream end flag: no more items in this direction.
    pub const STREAM_END: u8 = 0b0000_1000;

    /// Reserved bits mask (bits 4-7).
    pub const RESERVED_MASK: u8 = 0b1111_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    // Client to server

    /// Single request (unary or server-stream opening) = 0x00
    pub const REQUEST: u8 = 0;
    /// One item of a client-driven stream = 0x04
    pub const STREAM_ITEM: u8 = IS_STREAM;
    /// Half-close: the client sends nothing more = 0x0C
    pub const HALF_CLOSE: u8 = IS_STREAM | STREAM_END;

    // Server to client

    /// Single response = 0x01
    pub const RESPONSE: u8 = IS_RESPONSE;
    /// Error response, payload is a `Status` = 0x03
    pub const ERROR_RESPONSE: u8 = IS_RESPONSE | IS_ERROR;
    /// One item of a server-driven stream = 0x05
    pub const STREAM_RESPONSE: u8 = IS_RESPONSE | IS_STREAM;
    /// End-of-sequence marker = 0x0D
    pub const STREAM_END_RESPONSE: u8 = IS_RESPONSE | IS_STREAM | STREAM_END;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Method identifier (1-65534, 0 reserved, 0xFFFF = cancel).
    pub method_id: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Call identifier, unique per open call on a connection.
    pub call_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(method_id: u16, flags: u8, call_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            call_id,
            payload_length,
        }
    }

    /// Header of a cancel frame for the given call.
    pub fn cancel(call_id: u32) -> Self {
        Self::new(CANCEL_METHOD_ID, flags::REQUEST, call_id, 0)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use ordermgmt_client::protocol::{Header, flags};
    ///
    /// let header = Header::new(1, flags::RESPONSE, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (11 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.method_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.call_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use ordermgmt_client::protocol::Header;
    ///
    /// let bytes = [0, 1, 0x01, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.method_id, 1);
    /// assert_eq!(header.call_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            method_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            call_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Method ID is not 0 (reserved)
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    /// - Stream end markers carry no payload
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(RpcError::Protocol("Method ID 0 is reserved".to_string()));
        }

        if self.payload_length > max_payload_size {
            return Err(RpcError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(RpcError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        if self.is_stream_end() && self.payload_length != 0 {
            return Err(RpcError::Protocol(
                "Stream end frame must have empty payload".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a cancel signal.
    #[inline]
    pub fn is_cancel(&self) -> bool {
        self.method_id == CANCEL_METHOD_ID
    }

    /// Check if this is a server-to-client frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    /// Check if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }

    /// Check if this is a stream item or marker.
    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }

    /// Check if this is an end-of-stream marker.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        flags::has_flag(self.flags, flags::STREAM_END)
    }
}
