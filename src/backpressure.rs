//! Backpressure for the outbound frame queue.
//!
//! Every outbound frame holds one slot from the moment a call queues it until
//! the writer task has flushed it to the socket. When all slots are taken,
//! senders park on the semaphore (no polling) until the writer frees slots or
//! the configured timeout expires.
//!
//! - `max_pending`: maximum number of queued-but-unwritten frames
//! - `timeout`: how long a sender may wait for a slot
//!
//! Defaults live in [`crate::writer::WriterConfig`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};

use crate::error::{Result, RpcError};

/// Shared slot accounting between call senders and the writer task.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    slots: Arc<Semaphore>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with custom timeout.
    pub fn with_timeout(max_pending: usize, timeout: Duration) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_pending)),
            max_pending,
            timeout,
        }
    }

    /// Reserve a slot, waiting up to the configured timeout.
    ///
    /// Fails with `ConnectionClosed` once the writer has shut down.
    pub async fn reserve(&self) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.slots.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                Ok(())
            }
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => Err(RpcError::BackpressureTimeout),
        }
    }

    /// Reserve a slot without waiting.
    pub fn try_reserve(&self) -> Result<()> {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => Err(RpcError::BackpressureTimeout),
            Err(TryAcquireError::Closed) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Return `count` slots (called after frames are written or dropped).
    #[inline]
    pub fn release(&self, count: usize) {
        self.slots.add_permits(count);
    }

    /// Wake every waiting sender with `ConnectionClosed`.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Get current pending count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.max_pending
            .saturating_sub(self.slots.available_permits())
    }
}
