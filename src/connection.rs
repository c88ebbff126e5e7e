//! Transport handle: one established session with the order service.
//!
//! A [`Connection`] owns two background tasks:
//! 1. the writer task (see [`crate::writer`]) shared by every call
//! 2. the read loop, which reassembles frames and routes each one to the
//!    inbound queue of the call that owns its call id
//!
//! When the read loop stops, for any reason, every open call is reset so no
//! consumer is left waiting on a dead socket. A call whose inbound queue is
//! full is reset and cancelled on its own; the read loop never waits on a
//! single consumer. [`Connection::close`] flushes queued frames before
//! releasing the socket; dropping the connection aborts both tasks at once.
//!
//! # Example
//!
//! ```ignore
//! use ordermgmt_client::{ClientConfig, Connection};
//!
//! let conn = Connection::connect(&ClientConfig::default()).await?;
//! let id: String = conn.unary(1, &order, Duration::from_secs(5)).await?;
//! conn.close().await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::call::{CallReceiver, CallSender};
use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, FrameBuffer, Header};
use crate::transport;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Size of a single socket read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long [`Connection::close`] waits for queued frames to be written.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// What the read loop delivers to a call.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A frame addressed to the call.
    Frame(Frame),
    /// The connection is gone; no more frames will arrive.
    Reset(String),
}

#[derive(Default)]
struct RegistryState {
    calls: HashMap<u32, mpsc::Sender<Inbound>>,
    closed: Option<String>,
}

/// Routing table from call id to the call's inbound queue.
#[derive(Default)]
pub(crate) struct CallRegistry {
    state: Mutex<RegistryState>,
}

impl CallRegistry {
    fn register(&self, call_id: u32, tx: mpsc::Sender<Inbound>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(RpcError::Send(format!("connection closed: {}", reason)));
        }
        if state.calls.contains_key(&call_id) {
            return Err(RpcError::InvalidState("call id already in use"));
        }
        state.calls.insert(call_id, tx);
        Ok(())
    }

    fn contains(&self, call_id: u32) -> bool {
        self.state.lock().calls.contains_key(&call_id)
    }

    /// Remove a call's route. Later frames for it are dropped.
    pub(crate) fn remove(&self, call_id: u32) {
        self.state.lock().calls.remove(&call_id);
    }

    fn route(&self, call_id: u32) -> Option<mpsc::Sender<Inbound>> {
        self.state.lock().calls.get(&call_id).cloned()
    }

    /// Reset every open call and refuse new ones.
    fn shutdown(&self, reason: &str) {
        let calls = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            std::mem::take(&mut state.calls)
        };

        for (call_id, tx) in calls {
            if tx.try_send(Inbound::Reset(reason.to_string())).is_err() {
                tracing::debug!("Call {} queue full or gone, closing without reset", call_id);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().calls.len()
    }
}

/// An established connection to the order service.
///
/// Calls opened on it hold their own handles to the writer and the routing
/// table, so streams may outlive the borrow used to open them and be moved
/// into other tasks.
pub struct Connection {
    /// `None` only while closing.
    writer: Option<WriterHandle>,
    registry: Arc<CallRegistry>,
    next_call_id: AtomicU32,
    call_queue_capacity: usize,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl Connection {
    /// Connect to the configured endpoint.
    ///
    /// Fails with [`RpcError::Connection`] if the session cannot be
    /// established within `config.connect_timeout`.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let (reader, writer) = transport::connect(&config.endpoint, config.connect_timeout).await?;
        tracing::debug!("Connected to {}", config.endpoint);
        Ok(Self::from_parts(reader, writer, config))
    }

    /// Adopt an already established byte stream (e.g. an in-memory duplex).
    pub fn from_stream<S>(stream: S, config: &ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }

    /// Build a connection from separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, config: &ClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = spawn_writer_task(writer, &config.writer);
        let registry = Arc::new(CallRegistry::default());

        let read_task = {
            let registry = registry.clone();
            let writer = writer.clone();
            let max_payload_size = config.max_payload_size;
            tokio::spawn(async move {
                let reason = match read_loop(reader, &registry, &writer, max_payload_size).await {
                    Ok(()) => "connection closed by server".to_string(),
                    Err(e) => {
                        tracing::error!("Read loop error: {}", e);
                        e.to_string()
                    }
                };
                registry.shutdown(&reason);
            })
        };

        Self {
            writer: Some(writer),
            registry,
            next_call_id: AtomicU32::new(1),
            call_queue_capacity: config.call_queue_capacity.max(1),
            read_task,
            writer_task,
        }
    }

    /// Open the two directions of a new call for `method_id`.
    pub(crate) fn open_call(&self, method_id: u16) -> Result<(CallSender, CallReceiver)> {
        let writer = self.writer.as_ref().ok_or(RpcError::ConnectionClosed)?;
        let call_id = self.allocate_call_id();
        // one slot beyond the frame budget is kept for the reset
        let (tx, rx) = mpsc::channel(self.call_queue_capacity + 1);
        self.registry.register(call_id, tx)?;

        tracing::trace!("Opened call {} for method {}", call_id, method_id);

        let sender = CallSender::new(method_id, call_id, writer.clone());
        let receiver = CallReceiver::new(call_id, rx, self.registry.clone(), writer.clone());
        Ok((sender, receiver))
    }

    fn allocate_call_id(&self) -> u32 {
        loop {
            let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !self.registry.contains(id) {
                return id;
            }
        }
    }

    /// Whether the connection can still carry new calls.
    pub fn is_open(&self) -> bool {
        !self.read_task.is_finished() && self.writer.as_ref().map_or(false, |w| !w.is_closed())
    }

    /// Get the current pending outbound frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.as_ref().map_or(0, WriterHandle::pending_count)
    }

    /// Release the session.
    ///
    /// Open calls are reset; their consumers observe a receive error. Frames
    /// already queued, such as cancels of abandoned calls, are written before
    /// the socket is shut down, waiting at most 500ms for calls still holding
    /// the writer to let go.
    pub async fn close(mut self) {
        tracing::debug!("Closing connection");
        self.read_task.abort();
        let _ = (&mut self.read_task).await;
        self.registry.shutdown("connection closed by client");
        self.writer = None;

        match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut self.writer_task).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Outbound frames flushed"),
            Ok(Ok(Err(e))) => tracing::debug!("Writer stopped with error on close: {}", e),
            Ok(Err(e)) => tracing::debug!("Writer task ended abnormally: {}", e),
            Err(_) => tracing::debug!("Writer still in use after {:?}, aborting", CLOSE_FLUSH_TIMEOUT),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.read_task.abort();
        self.writer_task.abort();
        self.registry.shutdown("connection closed by client");
    }
}

/// Reads frames until EOF and routes them to their calls.
async fn read_loop<R>(
    mut reader: R,
    registry: &CallRegistry,
    writer: &WriterHandle,
    max_payload_size: u32,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_payload(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(RpcError::Io(e)),
        };

        for frame in frame_buffer.push(&buf[..n])? {
            dispatch_frame(frame, registry, writer);
        }
    }
}

/// Route one frame without waiting on the owning call.
fn dispatch_frame(frame: Frame, registry: &CallRegistry, writer: &WriterHandle) {
    if !frame.is_response() || frame.is_cancel() {
        tracing::warn!(
            "Dropping unexpected client-direction frame for call {}",
            frame.call_id()
        );
        return;
    }

    let call_id = frame.call_id();
    let Some(tx) = registry.route(call_id) else {
        tracing::debug!("Dropping frame for unknown call {}", call_id);
        return;
    };

    if tx.capacity() <= 1 {
        reset_lagging_call(call_id, &tx, registry, writer);
        return;
    }

    match tx.try_send(Inbound::Frame(frame)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            reset_lagging_call(call_id, &tx, registry, writer);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => registry.remove(call_id),
    }
}

/// The call stopped draining its queue: reset it and cancel it on the server.
fn reset_lagging_call(
    call_id: u32,
    tx: &mpsc::Sender<Inbound>,
    registry: &CallRegistry,
    writer: &WriterHandle,
) {
    registry.remove(call_id);

    let reason = format!("call {} fell behind: inbound queue full", call_id);
    tracing::warn!("{}", reason);
    if tx.try_send(Inbound::Reset(reason)).is_err() {
        tracing::debug!("Call {} gone before its reset", call_id);
    }

    if let Err(e) = writer.try_send(OutboundFrame::empty(&Header::cancel(call_id))) {
        tracing::debug!("Could not send cancel for call {}: {}", call_id, e);
    }
}
