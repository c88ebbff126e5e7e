//! Server-stream consumer: one request, then a lazy sequence of responses.
//!
//! The sequence ends when the server sends its end-of-stream marker, which
//! surfaces as `Ok(None)`, never as an error.
//!
//! # Example
//!
//! ```ignore
//! let mut results = conn.server_stream::<_, Order>(3, &"Google", deadline).await?;
//! while let Some(order) = results.message().await? {
//!     println!("{:?}", order);
//! }
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{deadline_from, InboundStream};
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::flags;

/// A finite, non-restartable sequence of responses.
pub struct ServerStream<T> {
    inner: InboundStream<T>,
}

impl<T: DeserializeOwned> ServerStream<T> {
    /// Pull the next response, suspending until it arrives.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted, and on every call
    /// after that. After an error the stream is also exhausted.
    pub async fn message(&mut self) -> Result<Option<T>> {
        self.inner.next().await
    }

    /// Drain the remaining responses.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.message().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Number of responses pulled so far.
    pub fn received(&self) -> usize {
        self.inner.received()
    }

    /// Whether the sequence has ended.
    pub fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }
}

impl Connection {
    /// Send `request` to `method_id` and return the response sequence.
    ///
    /// `timeout` bounds the whole call, including every pull.
    pub async fn server_stream<Req, Resp>(
        &self,
        method_id: u16,
        request: &Req,
        timeout: Duration,
    ) -> Result<ServerStream<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let deadline = deadline_from(timeout);
        let (sender, receiver) = self.open_call(method_id)?;

        sender
            .send_message(flags::REQUEST, request, deadline)
            .await?;

        Ok(ServerStream {
            inner: InboundStream::new(receiver, deadline),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::MsgPackCodec;
    use crate::config::ClientConfig;
    use crate::connection::Connection;
    use crate::error::RpcError;
    use crate::protocol::{build_frame, flags, FrameBuffer, Header};
    use crate::status::{Code, Status};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn accept_request(server: &mut DuplexStream) -> u32 {
        let mut buffer = FrameBuffer::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            if let Some(frame) = buffer.push(&buf[..n]).unwrap().into_iter().next() {
                return frame.call_id();
            }
        }
    }

    fn item(call_id: u32, value: u32) -> Vec<u8> {
        let payload = MsgPackCodec::encode(&value).unwrap();
        build_frame(
            &Header::new(3, flags::STREAM_RESPONSE, call_id, payload.len() as u32),
            &payload,
        )
    }

    fn end(call_id: u32) -> Vec<u8> {
        build_frame(&Header::new(3, flags::STREAM_END_RESPONSE, call_id, 0), b"")
    }

    #[tokio::test]
    async fn test_items_then_exhaustion() {
        let (client, mut server) = duplex(64 * 1024);
        let conn = Connection::from_stream(client, &ClientConfig::default());

        let mut stream = conn
            .server_stream::<_, u32>(3, &"Google", Duration::from_secs(1))
            .await
            .unwrap();

        let call_id = accept_request(&mut server).await;
        let mut bytes = item(call_id, 7);
        bytes.extend(item(call_id, 8));
        bytes.extend(end(call_id));
        server.write_all(&bytes).await.unwrap();

        assert_eq!(stream.message().await.unwrap(), Some(7));
        assert_eq!(stream.message().await.unwrap(), Some(8));
        assert_eq!(stream.message().await.unwrap(), None);
        assert_eq!(stream.message().await.unwrap(), None);
        assert_eq!(stream.received(), 2);
        assert!(stream.is_exhausted());
    }

    #[tokio::test]
    async fn test_empty_sequence() {
        let (client, mut server) = duplex(64 * 1024);
        let conn = Connection::from_stream(client, &ClientConfig::default());

        let stream = conn
            .server_stream::<_, u32>(3, &"nothing", Duration::from_secs(1))
            .await
            .unwrap();

        let call_id = accept_request(&mut server).await;
        server.write_all(&end(call_id)).await.unwrap();

        assert!(stream.collect_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_mid_stream_is_terminal() {
        let (client, mut server) = duplex(64 * 1024);
        let conn = Connection::from_stream(client, &ClientConfig::default());

        let mut stream = conn
            .server_stream::<_, u32>(3, &"Google", Duration::from_secs(1))
            .await
            .unwrap();

        let call_id = accept_request(&mut server).await;
        let status = MsgPackCodec::encode(&Status::internal("index offline")).unwrap();
        let mut bytes = item(call_id, 1);
        bytes.extend(build_frame(
            &Header::new(3, flags::ERROR_RESPONSE, call_id, status.len() as u32),
            &status,
        ));
        server.write_all(&bytes).await.unwrap();

        assert_eq!(stream.message().await.unwrap(), Some(1));
        let err = stream.message().await.unwrap_err();
        assert_eq!(err.status().map(|s| s.code()), Some(Code::Internal));
        assert_eq!(stream.message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deadline_while_pulling() {
        let (client, mut server) = duplex(64 * 1024);
        let conn = Connection::from_stream(client, &ClientConfig::default());

        let mut stream = conn
            .server_stream::<_, u32>(3, &"slow", Duration::from_millis(50))
            .await
            .unwrap();
        let call_id = accept_request(&mut server).await;
        server.write_all(&item(call_id, 1)).await.unwrap();

        assert_eq!(stream.message().await.unwrap(), Some(1));
        assert!(matches!(
            stream.message().await,
            Err(RpcError::DeadlineExceeded)
        ));
    }
}
