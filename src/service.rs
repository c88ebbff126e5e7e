//! Order-management service contract: message types, method ids and a typed
//! client over a [`Connection`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::call::bidi::BidiStream;
use crate::call::client_stream::ClientStream;
use crate::call::server_stream::ServerStream;
use crate::connection::Connection;
use crate::error::Result;

/// Method ids on the wire.
pub mod methods {
    /// Unary: `Order` in, order id out.
    pub const ADD_ORDER: u16 = 1;
    /// Unary: order id in, `Order` out.
    pub const GET_ORDER: u16 = 2;
    /// Server stream: search query in, matching `Order`s out.
    pub const SEARCH_ORDERS: u16 = 3;
    /// Client stream: `Order`s in, summary string out.
    pub const UPDATE_ORDERS: u16 = 4;
    /// Bidirectional: order ids in, `CombinedShipment`s out.
    pub const PROCESS_ORDERS: u16 = 5;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub items: Vec<String>,
    pub destination: String,
    pub price: f32,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        items: &[&str],
        destination: impl Into<String>,
        price: f32,
    ) -> Self {
        Self {
            id: id.into(),
            items: items.iter().map(|item| item.to_string()).collect(),
            destination: destination.into(),
            price,
        }
    }
}

/// A batch of processed orders bound for one destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedShipment {
    pub id: String,
    pub status: String,
    pub orders_list: Vec<Order>,
}

/// Typed calls against the order-management service.
///
/// Every call uses the same per-call deadline.
pub struct OrderManagementClient {
    conn: Connection,
    deadline: Duration,
}

impl OrderManagementClient {
    pub fn new(conn: Connection, deadline: Duration) -> Self {
        Self { conn, deadline }
    }

    pub async fn add_order(&self, order: &Order) -> Result<String> {
        self.conn
            .unary(methods::ADD_ORDER, order, self.deadline)
            .await
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.conn
            .unary(methods::GET_ORDER, &id, self.deadline)
            .await
    }

    pub async fn search_orders(&self, query: &str) -> Result<ServerStream<Order>> {
        self.conn
            .server_stream(methods::SEARCH_ORDERS, &query, self.deadline)
            .await
    }

    pub fn update_orders(&self) -> Result<ClientStream<Order, String>> {
        self.conn.client_stream(methods::UPDATE_ORDERS, self.deadline)
    }

    pub fn process_orders(&self) -> Result<BidiStream<String, CombinedShipment>> {
        self.conn.bidi(methods::PROCESS_ORDERS, self.deadline)
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the underlying connection.
    pub async fn close(self) {
        self.conn.close().await
    }
}
