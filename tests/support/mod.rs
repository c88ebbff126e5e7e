//! Scripted in-process order service speaking the wire protocol over an
//! in-memory duplex stream.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use ordermgmt_client::codec::MsgPackCodec;
use ordermgmt_client::protocol::{build_frame, flags, Frame, FrameBuffer, Header};
use ordermgmt_client::service::methods;
use ordermgmt_client::{ClientConfig, CombinedShipment, Connection, Order, Status};
use serde::Serialize;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// One frame the server received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seen {
    pub method_id: u16,
    pub flags: u8,
    pub call_id: u32,
}

/// Everything the server received, returned when the client disconnects.
#[derive(Debug, Default)]
pub struct ServerLog {
    pub frames: Vec<Seen>,
    pub processed: Vec<String>,
}

impl ServerLog {
    pub fn cancels(&self) -> usize {
        self.frames.iter().filter(|f| f.method_id == 0xFFFF).count()
    }

    pub fn half_closes(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.method_id != 0xFFFF && f.flags == flags::HALF_CLOSE)
            .count()
    }
}

/// Behavior knobs for the scripted server.
#[derive(Debug, Clone)]
pub struct OrderServer {
    pub orders: BTreeMap<String, Order>,
    /// Delay between the client's half-close and the end of a shipment stream.
    pub final_delay: Duration,
    /// On half-close, emit one more shipment listing every processed order.
    pub final_shipment: bool,
    /// Drop the connection after this many shipments.
    pub break_after_shipments: Option<usize>,
    /// Never answer order processing; only read.
    pub silent_processing: bool,
}

impl Default for OrderServer {
    fn default() -> Self {
        let seed = [
            Order::new("102", &["Google Pixel 3A", "Mac Book Pro"], "Mountain View, CA", 1800.0),
            Order::new("103", &["Apple Watch S4"], "San Jose, CA", 400.0),
            Order::new("104", &["Google Home Mini", "Google Nest Hub"], "Mountain View, CA", 400.0),
            Order::new("105", &["Amazon Echo"], "San Jose, CA", 30.0),
        ];
        Self {
            orders: seed.into_iter().map(|o| (o.id.clone(), o)).collect(),
            final_delay: Duration::ZERO,
            final_shipment: false,
            break_after_shipments: None,
            silent_processing: false,
        }
    }
}

enum Step {
    Continue,
    Disconnect,
}

#[derive(Default)]
struct CallState {
    updated: Vec<String>,
    processed: Vec<Order>,
}

impl OrderServer {
    /// Start the server and return a client connection to it.
    pub fn start(self) -> (Connection, JoinHandle<ServerLog>) {
        self.start_with(&ClientConfig::default())
    }

    pub fn start_with(self, config: &ClientConfig) -> (Connection, JoinHandle<ServerLog>) {
        let (client, server) = duplex(256 * 1024);
        let conn = Connection::from_stream(client, config);
        (conn, tokio::spawn(self.serve(server)))
    }

    async fn serve(mut self, mut io: DuplexStream) -> ServerLog {
        let mut log = ServerLog::default();
        let mut calls: HashMap<u32, CallState> = HashMap::new();
        let mut shipments = 0usize;
        let mut buffer = FrameBuffer::new();
        let mut buf = vec![0u8; 8192];

        loop {
            let n = match io.read(&mut buf).await {
                Ok(0) | Err(_) => return log,
                Ok(n) => n,
            };
            let frames = match buffer.push(&buf[..n]) {
                Ok(frames) => frames,
                Err(_) => return log,
            };

            for frame in frames {
                log.frames.push(Seen {
                    method_id: frame.method_id(),
                    flags: frame.flags(),
                    call_id: frame.call_id(),
                });
                if frame.is_cancel() {
                    calls.remove(&frame.call_id());
                    continue;
                }

                let state = calls.entry(frame.call_id()).or_default();
                let step = self
                    .handle(&frame, state, &mut shipments, &mut log, &mut io)
                    .await;
                if let Step::Disconnect = step {
                    return log;
                }
            }
        }
    }

    async fn handle(
        &mut self,
        frame: &Frame,
        state: &mut CallState,
        shipments: &mut usize,
        log: &mut ServerLog,
        io: &mut DuplexStream,
    ) -> Step {
        let call_id = frame.call_id();
        let method = frame.method_id();
        let half_close = frame.flags() == flags::HALF_CLOSE;

        match method {
            methods::ADD_ORDER => {
                let order: Order = MsgPackCodec::decode(frame.payload()).unwrap();
                let id = order.id.clone();
                self.orders.insert(id.clone(), order);
                reply(io, method, flags::RESPONSE, call_id, &id).await;
            }
            methods::GET_ORDER => {
                let id: String = MsgPackCodec::decode(frame.payload()).unwrap();
                match self.orders.get(&id) {
                    Some(order) => reply(io, method, flags::RESPONSE, call_id, order).await,
                    None => {
                        let status = Status::not_found(format!("Order does not exist. : {}", id));
                        reply(io, method, flags::ERROR_RESPONSE, call_id, &status).await
                    }
                }
            }
            methods::SEARCH_ORDERS => {
                let query: String = MsgPackCodec::decode(frame.payload()).unwrap();
                for order in self.orders.values() {
                    if order.items.iter().any(|item| item.contains(&query)) {
                        reply(io, method, flags::STREAM_RESPONSE, call_id, order).await;
                    }
                }
                end_stream(io, method, call_id).await;
            }
            methods::UPDATE_ORDERS if half_close => {
                let summary = format!("Orders processed {}", state.updated.join(", "));
                reply(io, method, flags::RESPONSE, call_id, &summary).await;
            }
            methods::UPDATE_ORDERS => {
                let order: Order = MsgPackCodec::decode(frame.payload()).unwrap();
                state.updated.push(order.id.clone());
                self.orders.insert(order.id.clone(), order);
            }
            methods::PROCESS_ORDERS if self.silent_processing => {}
            methods::PROCESS_ORDERS if half_close => {
                tokio::time::sleep(self.final_delay).await;
                if self.final_shipment {
                    let shipment = CombinedShipment {
                        id: "cmb-final".to_string(),
                        status: "Processed!".to_string(),
                        orders_list: state.processed.clone(),
                    };
                    reply(io, method, flags::STREAM_RESPONSE, call_id, &shipment).await;
                }
                end_stream(io, method, call_id).await;
            }
            methods::PROCESS_ORDERS => {
                let id: String = MsgPackCodec::decode(frame.payload()).unwrap();
                log.processed.push(id.clone());
                let order = self.orders.get(&id).cloned().unwrap_or(Order {
                    id,
                    ..Order::default()
                });
                state.processed.push(order.clone());
                *shipments += 1;

                let shipment = CombinedShipment {
                    id: format!("cmb-{}", shipments),
                    status: "Processed!".to_string(),
                    orders_list: vec![order],
                };
                reply(io, method, flags::STREAM_RESPONSE, call_id, &shipment).await;

                if self.break_after_shipments == Some(*shipments) {
                    return Step::Disconnect;
                }
            }
            _ => {
                let status = Status::new(ordermgmt_client::Code::Unimplemented, "unknown method");
                reply(io, method, flags::ERROR_RESPONSE, call_id, &status).await;
            }
        }
        Step::Continue
    }
}

async fn reply<T: Serialize>(io: &mut DuplexStream, method: u16, frame_flags: u8, call_id: u32, value: &T) {
    let payload = MsgPackCodec::encode(value).unwrap();
    let header = Header::new(method, frame_flags, call_id, payload.len() as u32);
    let _ = io.write_all(&build_frame(&header, &payload)).await;
}

async fn end_stream(io: &mut DuplexStream, method: u16, call_id: u32) {
    let header = Header::new(method, flags::STREAM_END_RESPONSE, call_id, 0);
    let _ = io.write_all(&build_frame(&header, &[])).await;
}
