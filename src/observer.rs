//! Injectable sinks for call outcomes.
//!
//! Two seams:
//! - [`StreamObserver`] receives each response of a bidirectional call on
//!   the consumer task
//! - [`Reporter`] receives the outcome of every call the orchestrator makes
//!
//! The defaults log through `tracing`. Tests substitute recording sinks.

use std::fmt::Debug;

use crate::error::RpcError;
use crate::service::{CombinedShipment, Order};

/// Per-message callback run by a stream consumer.
pub trait StreamObserver<T>: Send {
    /// Called once per received message, in arrival order.
    fn on_message(&mut self, message: &T);

    /// Called once when the server ended the stream cleanly.
    fn on_end(&mut self) {}

    /// Called once when the stream failed. No further callbacks follow.
    fn on_error(&mut self, _error: &RpcError) {}
}

impl<T, O: StreamObserver<T> + ?Sized> StreamObserver<T> for Box<O> {
    fn on_message(&mut self, message: &T) {
        (**self).on_message(message)
    }

    fn on_end(&mut self) {
        (**self).on_end()
    }

    fn on_error(&mut self, error: &RpcError) {
        (**self).on_error(error)
    }
}

/// Observer that ignores every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardObserver;

impl<T> StreamObserver<T> for DiscardObserver {
    fn on_message(&mut self, _message: &T) {}
}

/// Observer that logs each message at info level.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    label: &'static str,
}

impl TracingObserver {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl<T: Debug> StreamObserver<T> for TracingObserver {
    fn on_message(&mut self, message: &T) {
        tracing::info!("{}: {:?}", self.label, message);
    }

    fn on_end(&mut self) {
        tracing::debug!("{}: stream ended", self.label);
    }

    fn on_error(&mut self, error: &RpcError) {
        tracing::warn!("{}: stream failed: {}", self.label, error);
    }
}

/// Receives the result of each call in an orchestrated run.
pub trait Reporter: Send + Sync {
    fn order_added(&self, id: &str);

    fn order_retrieved(&self, order: &Order);

    fn search_result(&self, order: &Order);

    fn search_finished(&self, count: usize);

    fn orders_updated(&self, summary: &str);

    /// Observer for shipments produced by order processing.
    fn shipment_observer(&self) -> Box<dyn StreamObserver<CombinedShipment>>;

    fn processing_finished(&self, sent: usize, received: usize);

    /// A call failed; the run continues with the next call.
    fn call_failed(&self, call: &'static str, error: &RpcError);
}

/// Default reporter: one log line per outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn order_added(&self, id: &str) {
        tracing::info!("AddOrder Response -> {}", id);
    }

    fn order_retrieved(&self, order: &Order) {
        tracing::info!("GetOrder Response -> {:?}", order);
    }

    fn search_result(&self, order: &Order) {
        tracing::info!("Search Result : {:?}", order);
    }

    fn search_finished(&self, count: usize) {
        tracing::debug!("Search finished with {} results", count);
    }

    fn orders_updated(&self, summary: &str) {
        tracing::info!("Update Orders Res : {}", summary);
    }

    fn shipment_observer(&self) -> Box<dyn StreamObserver<CombinedShipment>> {
        Box::new(TracingObserver::new("Combined shipment"))
    }

    fn processing_finished(&self, sent: usize, received: usize) {
        tracing::info!(
            "Order processing finished: {} orders sent, {} shipments received",
            sent,
            received
        );
    }

    fn call_failed(&self, call: &'static str, error: &RpcError) {
        tracing::error!("{} failed: {}", call, error);
    }
}
