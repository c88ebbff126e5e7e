//! Call module - the four interaction shapes.
//!
//! - [`unary`] - one request, one response
//! - [`server_stream`] - one request, a lazy sequence of responses
//! - [`client_stream`] - a sequence of requests, one aggregate response
//! - [`bidi`] - independent request and response sequences on one call
//!
//! Every shape is built from the same two halves: a [`CallSender`] that
//! queues client frames on the shared writer, and a [`CallReceiver`] that
//! owns the call's route in the connection's routing table. Every
//! suspension point is bounded by the call's absolute deadline.

pub mod bidi;
pub mod client_stream;
pub mod server_stream;
pub mod unary;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::codec::MsgPackCodec;
use crate::connection::{CallRegistry, Inbound};
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, FrameKind, Header};
use crate::status::Status;
use crate::writer::{OutboundFrame, WriterHandle};

/// Used when a caller passes a timeout too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Turn a relative timeout into the call's absolute deadline.
pub(crate) fn deadline_from(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// Map an error frame to the error it reports.
pub(crate) fn status_error(frame: &Frame) -> RpcError {
    match MsgPackCodec::decode::<Status>(frame.payload()) {
        Ok(status) => status.into(),
        Err(e) => RpcError::Protocol(format!("undecodable error status: {}", e)),
    }
}

/// Client-to-server direction of one call.
pub(crate) struct CallSender {
    method_id: u16,
    call_id: u32,
    writer: WriterHandle,
}

impl CallSender {
    pub(crate) fn new(method_id: u16, call_id: u32, writer: WriterHandle) -> Self {
        Self {
            method_id,
            call_id,
            writer,
        }
    }

    #[inline]
    pub(crate) fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Encode `message` and queue it with the given flags.
    pub(crate) async fn send_message<T: Serialize>(
        &self,
        frame_flags: u8,
        message: &T,
        deadline: Instant,
    ) -> Result<()> {
        let payload = MsgPackCodec::encode(message)?;
        self.send_frame(frame_flags, Bytes::from(payload), deadline)
            .await
    }

    /// Queue a frame, waiting out backpressure no longer than `deadline`.
    pub(crate) async fn send_frame(
        &self,
        frame_flags: u8,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<()> {
        let header = Header::new(self.method_id, frame_flags, self.call_id, 0);
        let frame = OutboundFrame::new(&header, payload);

        match tokio::time::timeout_at(deadline, self.writer.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RpcError::Send(e.to_string())),
            Err(_) => Err(RpcError::DeadlineExceeded),
        }
    }

    /// Queue an empty frame without waiting. For `Drop` paths.
    pub(crate) fn try_send_empty(&self, frame_flags: u8) -> Result<()> {
        let header = Header::new(self.method_id, frame_flags, self.call_id, 0);
        self.writer.try_send(OutboundFrame::empty(&header))
    }
}

/// Server-to-client direction of one call.
///
/// Owns the call's route. Dropping it before the server finished the call
/// sends a cancel frame so the server can release the call too.
pub(crate) struct CallReceiver {
    call_id: u32,
    rx: mpsc::Receiver<Inbound>,
    registry: Arc<CallRegistry>,
    writer: WriterHandle,
    finished: bool,
}

impl CallReceiver {
    pub(crate) fn new(
        call_id: u32,
        rx: mpsc::Receiver<Inbound>,
        registry: Arc<CallRegistry>,
        writer: WriterHandle,
    ) -> Self {
        Self {
            call_id,
            rx,
            registry,
            writer,
            finished: false,
        }
    }

    #[inline]
    pub(crate) fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Wait for the next frame of this call.
    ///
    /// Deadline expiry cancels the call. A connection reset is a
    /// [`RpcError::Receive`].
    pub(crate) async fn recv(&mut self, deadline: Instant) -> Result<Frame> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(Inbound::Frame(frame))) => Ok(frame),
            Ok(Some(Inbound::Reset(reason))) => {
                self.finish();
                Err(RpcError::Receive(reason))
            }
            Ok(None) => {
                self.finish();
                Err(RpcError::Receive(
                    "connection closed before the call completed".to_string(),
                ))
            }
            Err(_) => {
                self.cancel();
                Err(RpcError::DeadlineExceeded)
            }
        }
    }

    /// The server has ended the call; stop routing to it.
    pub(crate) fn finish(&mut self) {
        self.finished = true;
        self.registry.remove(self.call_id);
    }

    /// Abandon the call and tell the server.
    pub(crate) fn cancel(&mut self) {
        if self.finished {
            return;
        }
        self.finish();
        if let Err(e) = self
            .writer
            .try_send(OutboundFrame::empty(&Header::cancel(self.call_id)))
        {
            tracing::debug!("Could not send cancel for call {}: {}", self.call_id, e);
        } else {
            tracing::debug!("Cancelled call {}", self.call_id);
        }
    }
}

impl Drop for CallReceiver {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Typed reader over a server-driven sequence of stream items.
///
/// Shared by server streams and the receive half of bidirectional streams.
pub(crate) struct InboundStream<T> {
    receiver: CallReceiver,
    deadline: Instant,
    exhausted: bool,
    received: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> InboundStream<T> {
    pub(crate) fn new(receiver: CallReceiver, deadline: Instant) -> Self {
        Self {
            receiver,
            deadline,
            exhausted: false,
            received: 0,
            _marker: PhantomData,
        }
    }

    /// Next item, `None` once the end-of-stream marker arrived.
    ///
    /// Any error is terminal: later calls return `Ok(None)`.
    pub(crate) async fn next(&mut self) -> Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }

        let result = self.next_inner().await;
        if !matches!(result, Ok(Some(_))) {
            self.exhausted = true;
        }
        result
    }

    async fn next_inner(&mut self) -> Result<Option<T>> {
        let frame = self.receiver.recv(self.deadline).await?;

        match frame.kind() {
            FrameKind::StreamItem => match MsgPackCodec::decode(frame.payload()) {
                Ok(item) => {
                    self.received += 1;
                    Ok(Some(item))
                }
                Err(e) => {
                    self.receiver.cancel();
                    Err(e)
                }
            },
            FrameKind::StreamEnd => {
                self.receiver.finish();
                Ok(None)
            }
            FrameKind::Error => {
                self.receiver.finish();
                Err(status_error(&frame))
            }
            FrameKind::Response => {
                self.receiver.cancel();
                Err(RpcError::Protocol(
                    "single response frame on a streaming call".to_string(),
                ))
            }
        }
    }

    #[inline]
    pub(crate) fn received(&self) -> usize {
        self.received
    }

    #[inline]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[inline]
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    #[inline]
    pub(crate) fn call_id(&self) -> u32 {
        self.receiver.call_id()
    }
}

/// Await the single response that ends a unary or client-streaming call.
pub(crate) async fn recv_single<T: DeserializeOwned>(
    receiver: &mut CallReceiver,
    deadline: Instant,
) -> Result<T> {
    let frame = receiver.recv(deadline).await?;

    match frame.kind() {
        FrameKind::Response => {
            receiver.finish();
            MsgPackCodec::decode(frame.payload())
        }
        FrameKind::Error => {
            receiver.finish();
            Err(status_error(&frame))
        }
        kind => {
            receiver.cancel();
            Err(RpcError::Protocol(format!(
                "expected a single response, got {:?} frame",
                kind
            )))
        }
    }
}
