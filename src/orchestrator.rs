//! Sequential run of the four call shapes over one connection.
//!
//! Per-call failures are reported and recorded; the run continues with the
//! next call. Only failing to connect aborts.

use std::sync::Arc;
use std::time::Duration;

use crate::call::bidi::{BidiCoordinator, BidiSummary};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Result, RpcError};
use crate::observer::Reporter;
use crate::service::{Order, OrderManagementClient};

pub const ADD_ORDER: &str = "AddOrder";
pub const GET_ORDER: &str = "GetOrder";
pub const SEARCH_ORDERS: &str = "SearchOrders";
pub const UPDATE_ORDERS: &str = "UpdateOrders";
pub const PROCESS_ORDERS: &str = "ProcessOrders";

/// Inputs for one run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub new_order: Order,
    pub lookup_id: String,
    pub search_query: String,
    pub updates: Vec<Order>,
    /// Sent before the shipment consumer starts.
    pub process_initial: Vec<String>,
    /// Sent after `process_pause`.
    pub process_late: Vec<String>,
    pub process_pause: Duration,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            new_order: Order::new(
                "101",
                &["iPhone XS", "Mac Book Pro"],
                "San Jose, CA",
                2300.00,
            ),
            lookup_id: "106".to_string(),
            search_query: "Google".to_string(),
            updates: vec![
                Order::new(
                    "102",
                    &["google Pixel 3A", "Google Pixel Book"],
                    "Mountain View, CA",
                    1100.00,
                ),
                Order::new("103", &["Apple Watch S4", "iPad Pro"], "San Jose, CA", 2800.00),
                Order::new(
                    "104",
                    &["Google Home Mini", "Google Nest Hub", "iPad Mini"],
                    "Mountain View, CA",
                    2200.00,
                ),
            ],
            process_initial: vec!["102".to_string(), "103".to_string(), "104".to_string()],
            process_late: vec!["101".to_string()],
            process_pause: Duration::from_secs(1),
        }
    }
}

/// Outcome of one call in a run.
#[derive(Debug)]
pub struct CallRecord {
    pub name: &'static str,
    pub error: Option<RpcError>,
}

impl CallRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of every call in a run, in call order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub calls: Vec<CallRecord>,
    /// Set when order processing reached its termination point cleanly.
    pub processing: Option<BidiSummary>,
}

impl RunReport {
    pub fn get(&self, name: &str) -> Option<&CallRecord> {
        self.calls.iter().find(|record| record.name == name)
    }

    pub fn all_succeeded(&self) -> bool {
        self.calls.iter().all(CallRecord::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().filter(|record| !record.succeeded())
    }

    fn record(&mut self, name: &'static str, result: Result<()>) {
        self.calls.push(CallRecord {
            name,
            error: result.err(),
        });
    }
}

pub struct Orchestrator {
    client: OrderManagementClient,
    reporter: Arc<dyn Reporter>,
    scenario: Scenario,
}

impl Orchestrator {
    pub fn new(client: OrderManagementClient, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            client,
            reporter,
            scenario: Scenario::default(),
        }
    }

    /// Connect using `config`. Fails with [`RpcError::Connection`].
    pub async fn connect(config: &ClientConfig, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let conn = Connection::connect(config).await?;
        Ok(Self::new(
            OrderManagementClient::new(conn, config.call_deadline),
            reporter,
        ))
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run every call once, in order.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();

        let result = self.add_order().await;
        self.check(ADD_ORDER, &result);
        report.record(ADD_ORDER, result);

        let result = self.get_order().await;
        self.check(GET_ORDER, &result);
        report.record(GET_ORDER, result);

        let result = self.search_orders().await;
        self.check(SEARCH_ORDERS, &result);
        report.record(SEARCH_ORDERS, result);

        let result = self.update_orders().await;
        self.check(UPDATE_ORDERS, &result);
        report.record(UPDATE_ORDERS, result);

        let result = self.process_orders().await.map(|summary| {
            report.processing = Some(summary);
        });
        self.check(PROCESS_ORDERS, &result);
        report.record(PROCESS_ORDERS, result);

        report
    }

    /// Release the connection.
    pub async fn close(self) {
        self.client.close().await
    }

    fn check(&self, name: &'static str, result: &Result<()>) {
        if let Err(e) = result {
            self.reporter.call_failed(name, e);
        }
    }

    async fn add_order(&self) -> Result<()> {
        let id = self.client.add_order(&self.scenario.new_order).await?;
        self.reporter.order_added(&id);
        Ok(())
    }

    async fn get_order(&self) -> Result<()> {
        let order = self.client.get_order(&self.scenario.lookup_id).await?;
        self.reporter.order_retrieved(&order);
        Ok(())
    }

    async fn search_orders(&self) -> Result<()> {
        let mut results = self.client.search_orders(&self.scenario.search_query).await?;
        while let Some(order) = results.message().await? {
            self.reporter.search_result(&order);
        }
        self.reporter.search_finished(results.received());
        Ok(())
    }

    async fn update_orders(&self) -> Result<()> {
        let mut updates = self.client.update_orders()?;
        for order in &self.scenario.updates {
            updates.send(order).await?;
        }
        let summary = updates.finish().await?;
        self.reporter.orders_updated(&summary);
        Ok(())
    }

    async fn process_orders(&self) -> Result<BidiSummary> {
        let mut coordinator = BidiCoordinator::new(self.client.process_orders()?);

        for id in &self.scenario.process_initial {
            coordinator.send(id).await?;
        }
        coordinator.spawn_consumer(self.reporter.shipment_observer())?;

        tokio::time::sleep(self.scenario.process_pause).await;

        for id in &self.scenario.process_late {
            coordinator.send(id).await?;
        }

        let summary = coordinator.close().await?;
        self.reporter
            .processing_finished(summary.sent, summary.received);
        Ok(summary)
    }
}
