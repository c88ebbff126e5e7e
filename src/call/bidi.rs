//! Bidirectional streaming: independent request and response sequences on
//! one call, reconciled at a single termination point.
//!
//! The low-level API is [`BidiStream::split`], which hands the two
//! directions to different owners. [`BidiCoordinator`] wraps both halves
//! and enforces the closure protocol:
//!
//! 1. send every request
//! 2. half-close the request direction
//! 3. wait for the consumer task to signal it has drained the responses
//!
//! The consumer task signals through a oneshot on every exit path, so the
//! driving flow never waits on a consumer that already stopped.
//!
//! # Example
//!
//! ```ignore
//! let mut coordinator = BidiCoordinator::new(conn.bidi(5, deadline)?);
//! coordinator.spawn_consumer(TracingObserver::new("shipment"))?;
//! for id in ["102", "103", "104"] {
//!     coordinator.send(&id.to_string()).await?;
//! }
//! let summary = coordinator.close().await?;
//! assert_eq!(summary.state, BidiState::FullyClosed);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{deadline_from, CallSender, InboundStream};
use crate::connection::Connection;
use crate::error::{Result, RpcError};
use crate::observer::{DiscardObserver, StreamObserver};
use crate::protocol::flags;

/// Lifecycle of a coordinated bidirectional call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidiState {
    /// Opened; nothing sent and no consumer yet.
    Open,
    /// Requests may be sent while responses are consumed.
    SendingAndReceiving,
    /// No more requests; responses are still being drained.
    SendHalfClosed,
    /// Half-closed and the consumer has stopped.
    FullyClosed,
    /// Abandoned after a deadline or transport failure.
    Cancelled,
}

impl fmt::Display for BidiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BidiState::Open => "OPEN",
            BidiState::SendingAndReceiving => "SENDING_AND_RECEIVING",
            BidiState::SendHalfClosed => "SEND_HALF_CLOSED",
            BidiState::FullyClosed => "FULLY_CLOSED",
            BidiState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// An open bidirectional call, not yet split.
pub struct BidiStream<Req, Resp> {
    sender: BidiSender<Req>,
    receiver: BidiReceiver<Resp>,
}

impl<Req, Resp> BidiStream<Req, Resp> {
    /// Separate the two directions.
    pub fn split(self) -> (BidiSender<Req>, BidiReceiver<Resp>) {
        (self.sender, self.receiver)
    }
}

/// Request direction of a bidirectional call.
///
/// Dropping it without [`finish_sending`](Self::finish_sending) half-closes
/// the call so the server can end the response sequence.
pub struct BidiSender<Req> {
    sender: CallSender,
    deadline: Instant,
    sent: usize,
    half_closed: bool,
    abandoned: bool,
    _marker: PhantomData<fn(&Req)>,
}

impl<Req: Serialize> BidiSender<Req> {
    /// Queue one request.
    pub async fn send(&mut self, request: &Req) -> Result<()> {
        if self.half_closed {
            return Err(RpcError::InvalidState("send after half-close"));
        }
        self.sender
            .send_message(flags::STREAM_ITEM, request, self.deadline)
            .await?;
        self.sent += 1;
        Ok(())
    }

    /// Declare that no more requests will be sent.
    pub async fn finish_sending(&mut self) -> Result<()> {
        if self.half_closed {
            return Err(RpcError::InvalidState("stream already half-closed"));
        }
        self.sender
            .send_frame(flags::HALF_CLOSE, Bytes::new(), self.deadline)
            .await?;
        self.half_closed = true;
        tracing::trace!(
            "Call {} half-closed after {} requests",
            self.sender.call_id(),
            self.sent
        );
        Ok(())
    }
}

impl<Req> BidiSender<Req> {
    pub fn is_half_closed(&self) -> bool {
        self.half_closed
    }

    /// Requests queued so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Give up on the call without half-closing it.
    fn abandon(&mut self) {
        self.abandoned = true;
    }
}

impl<Req> Drop for BidiSender<Req> {
    fn drop(&mut self) {
        if self.half_closed || self.abandoned {
            return;
        }
        if let Err(e) = self.sender.try_send_empty(flags::HALF_CLOSE) {
            tracing::debug!(
                "Could not half-close call {} on drop: {}",
                self.sender.call_id(),
                e
            );
        }
    }
}

/// Response direction of a bidirectional call.
pub struct BidiReceiver<Resp> {
    inner: InboundStream<Resp>,
}

impl<Resp: DeserializeOwned> BidiReceiver<Resp> {
    /// Next response, `None` once the server ended the sequence.
    pub async fn message(&mut self) -> Result<Option<Resp>> {
        self.inner.next().await
    }

    /// Responses received so far.
    pub fn received(&self) -> usize {
        self.inner.received()
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline()
    }
}

impl<Resp> BidiReceiver<Resp>
where
    Resp: DeserializeOwned + Send + 'static,
{
    /// Drain the responses on a separate task, feeding each to `observer`.
    ///
    /// The task fires the returned handle's rendezvous when it stops, after
    /// a clean end, an error or deadline expiry alike.
    pub fn spawn_consumer<O>(mut self, mut observer: O) -> ConsumerHandle
    where
        O: StreamObserver<Resp> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let call_id = self.inner.call_id();

        let task = tokio::spawn(async move {
            let outcome = loop {
                match self.message().await {
                    Ok(Some(message)) => observer.on_message(&message),
                    Ok(None) => {
                        observer.on_end();
                        break Ok(());
                    }
                    Err(e) => {
                        observer.on_error(&e);
                        break Err(e);
                    }
                }
            };

            let report = ConsumerReport {
                received: self.received(),
                outcome,
            };
            if tx.send(report).is_err() {
                tracing::debug!("Consumer for call {} finished unobserved", call_id);
            }
        });

        ConsumerHandle { rendezvous: rx, task }
    }
}

/// What a consumer task reports when it stops.
#[derive(Debug)]
pub struct ConsumerReport {
    /// Responses delivered to the observer.
    pub received: usize,
    /// `Ok` on a clean end of stream.
    pub outcome: Result<()>,
}

/// Rendezvous side of a spawned consumer. Dropping it aborts the task.
pub struct ConsumerHandle {
    rendezvous: oneshot::Receiver<ConsumerReport>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Wait for the consumer to stop.
    pub async fn wait(mut self) -> Result<ConsumerReport> {
        (&mut self.rendezvous).await.map_err(|_| stopped_silently())
    }

    /// Wait for the consumer to stop, no later than `deadline`.
    ///
    /// On expiry the task is aborted.
    pub async fn wait_until(mut self, deadline: Instant) -> Result<ConsumerReport> {
        match tokio::time::timeout_at(deadline, &mut self.rendezvous).await {
            Ok(report) => report.map_err(|_| stopped_silently()),
            Err(_) => Err(RpcError::DeadlineExceeded),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn stopped_silently() -> RpcError {
    RpcError::Protocol("consumer stopped without signalling".to_string())
}

/// Outcome of a coordinated call that reached its termination point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidiSummary {
    pub sent: usize,
    pub received: usize,
    pub state: BidiState,
}

/// Drives the request direction and owns the consumer's rendezvous.
pub struct BidiCoordinator<Req, Resp> {
    sender: BidiSender<Req>,
    receiver: Option<BidiReceiver<Resp>>,
    consumer: Option<ConsumerHandle>,
    state: BidiState,
}

impl<Req, Resp> BidiCoordinator<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned + Send + 'static,
{
    pub fn new(stream: BidiStream<Req, Resp>) -> Self {
        let (sender, receiver) = stream.split();
        Self {
            sender,
            receiver: Some(receiver),
            consumer: None,
            state: BidiState::Open,
        }
    }

    pub fn state(&self) -> BidiState {
        self.state
    }

    /// Requests sent so far.
    pub fn sent(&self) -> usize {
        self.sender.sent()
    }

    /// Start draining responses into `observer`.
    pub fn spawn_consumer<O>(&mut self, observer: O) -> Result<()>
    where
        O: StreamObserver<Resp> + 'static,
    {
        self.ensure_active()?;
        let receiver = self
            .receiver
            .take()
            .ok_or(RpcError::InvalidState("consumer already spawned"))?;

        self.consumer = Some(receiver.spawn_consumer(observer));
        if self.state == BidiState::Open {
            self.state = BidiState::SendingAndReceiving;
        }
        Ok(())
    }

    /// Send one request. Fails after half-close.
    ///
    /// A send failure tears the call down.
    pub async fn send(&mut self, request: &Req) -> Result<()> {
        self.ensure_active()?;
        if self.state == BidiState::SendHalfClosed {
            return Err(RpcError::InvalidState("send after half-close"));
        }

        if let Err(e) = self.sender.send(request).await {
            self.abandon();
            return Err(e);
        }
        self.state = BidiState::SendingAndReceiving;
        Ok(())
    }

    /// Half-close the request direction.
    pub async fn finish_sending(&mut self) -> Result<()> {
        self.ensure_active()?;

        if let Err(e) = self.sender.finish_sending().await {
            if !matches!(e, RpcError::InvalidState(_)) {
                self.abandon();
            }
            return Err(e);
        }
        self.state = BidiState::SendHalfClosed;
        Ok(())
    }

    /// Half-close if needed, then wait on the rendezvous.
    ///
    /// Responses are discarded if no consumer was spawned. The consumer's
    /// error, if any, is returned after the state has advanced.
    pub async fn close(&mut self) -> Result<BidiSummary> {
        self.ensure_active()?;
        if self.state != BidiState::SendHalfClosed {
            self.finish_sending().await?;
        }
        if self.receiver.is_some() {
            self.spawn_consumer(DiscardObserver)?;
        }

        let consumer = self
            .consumer
            .take()
            .ok_or(RpcError::InvalidState("no consumer to wait for"))?;

        let report = match consumer.wait_until(self.sender.deadline()).await {
            Ok(report) => report,
            Err(e) => {
                self.teardown(&e);
                return Err(e);
            }
        };

        if let Err(e) = report.outcome {
            self.teardown(&e);
            return Err(e);
        }

        self.state = BidiState::FullyClosed;
        Ok(BidiSummary {
            sent: self.sender.sent(),
            received: report.received,
            state: self.state,
        })
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            BidiState::FullyClosed | BidiState::Cancelled => {
                Err(RpcError::InvalidState("stream already closed"))
            }
            _ => Ok(()),
        }
    }

    /// Final state after the consumer stopped with `error`.
    fn teardown(&mut self, error: &RpcError) {
        if error.is_timeout() {
            self.abandon();
        } else {
            self.state = BidiState::FullyClosed;
        }
    }

    /// Stop both directions. The consumer task is aborted and the call
    /// cancelled.
    fn abandon(&mut self) {
        self.state = BidiState::Cancelled;
        self.sender.abandon();
        self.consumer = None;
        self.receiver = None;
    }
}

impl<Req, Resp> From<BidiStream<Req, Resp>> for BidiCoordinator<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned + Send + 'static,
{
    fn from(stream: BidiStream<Req, Resp>) -> Self {
        Self::new(stream)
    }
}

impl Connection {
    /// Open a bidirectional call to `method_id`. Nothing is sent yet.
    ///
    /// `timeout` bounds both directions, including the final rendezvous.
    pub fn bidi<Req, Resp>(&self, method_id: u16, timeout: Duration) -> Result<BidiStream<Req, Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let deadline = deadline_from(timeout);
        let (sender, receiver) = self.open_call(method_id)?;

        Ok(BidiStream {
            sender: BidiSender {
                sender,
                deadline,
                sent: 0,
                half_closed: false,
                abandoned: false,
                _marker: PhantomData,
            },
            receiver: BidiReceiver {
                inner: InboundStream::new(receiver, deadline),
            },
        })
    }
}
