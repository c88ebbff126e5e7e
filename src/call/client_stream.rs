//! Client-stream producer: a sequence of requests, one aggregate response.
//!
//! Nothing goes on the wire when the stream is opened. Each
//! [`ClientStream::send`] queues one stream item; [`ClientStream::finish`]
//! half-closes the request direction and waits for the server's summary.
//! `finish` consumes the stream, so sending after completion does not
//! compile.

use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use super::{deadline_from, recv_single, CallReceiver, CallSender};
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::flags;

/// Open client-streaming call.
pub struct ClientStream<Req, Resp> {
    sender: CallSender,
    receiver: CallReceiver,
    deadline: Instant,
    sent: usize,
    _marker: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp> ClientStream<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Queue one request.
    pub async fn send(&mut self, request: &Req) -> Result<()> {
        self.sender
            .send_message(flags::STREAM_ITEM, request, self.deadline)
            .await?;
        self.sent += 1;
        Ok(())
    }

    /// Half-close and wait for the single response.
    ///
    /// An error status the server sent early, while requests were still
    /// being queued, is returned here.
    pub async fn finish(mut self) -> Result<Resp> {
        self.sender
            .send_frame(flags::HALF_CLOSE, Bytes::new(), self.deadline)
            .await?;
        tracing::trace!(
            "Call {} half-closed after {} requests",
            self.sender.call_id(),
            self.sent
        );
        recv_single(&mut self.receiver, self.deadline).await
    }

    /// Number of requests queued so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Connection {
    /// Open a client-streaming call to `method_id`.
    ///
    /// `timeout` bounds the whole call, from the first send to the response.
    pub fn client_stream<Req, Resp>(
        &self,
        method_id: u16,
        timeout: Duration,
    ) -> Result<ClientStream<Req, Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let deadline = deadline_from(timeout);
        let (sender, receiver) = self.open_call(method_id)?;

        Ok(ClientStream {
            sender,
            receiver,
            deadline,
            sent: 0,
            _marker: PhantomData,
        })
    }
}
