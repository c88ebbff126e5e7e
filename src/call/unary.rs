//! Unary invoker: one request, one response.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{deadline_from, recv_single};
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::flags;

impl Connection {
    /// Send `request` to `method_id` and wait for its single response.
    ///
    /// Fails with [`crate::RpcError::DeadlineExceeded`] if no response
    /// arrives within `timeout`, or [`crate::RpcError::Remote`] if the server
    /// reports an error status.
    pub async fn unary<Req, Resp>(&self, method_id: u16, request: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let deadline = deadline_from(timeout);
        let (sender, mut receiver) = self.open_call(method_id)?;

        sender
            .send_message(flags::REQUEST, request, deadline)
            .await?;
        recv_single(&mut receiver, deadline).await
    }
}
