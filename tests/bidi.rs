//! Bidirectional coordination against the scripted order service: delivery
//! order, the rendezvous on every exit path and the closure protocol.

mod support;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{timeout, Instant};

use ordermgmt_client::{
    BidiCoordinator, BidiState, CombinedShipment, OrderManagementClient, RpcError, StreamObserver,
};
use support::OrderServer;

/// Records the order ids of every shipment and the running count.
#[derive(Clone, Default)]
struct ShipmentLog {
    ids: Arc<Mutex<Vec<String>>>,
    counts: Arc<Mutex<Vec<usize>>>,
    ended: Arc<Mutex<bool>>,
}

impl StreamObserver<CombinedShipment> for ShipmentLog {
    fn on_message(&mut self, shipment: &CombinedShipment) {
        let mut ids = self.ids.lock();
        ids.extend(shipment.orders_list.iter().map(|o| o.id.clone()));
        self.counts.lock().push(ids.len());
    }

    fn on_end(&mut self) {
        *self.ended.lock() = true;
    }
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}", 200 + i)).collect()
}

#[tokio::test]
async fn test_every_response_arrives_in_order() {
    for n in [0usize, 1, 5, 40] {
        let (conn, _server) = OrderServer::default().start();
        let client = OrderManagementClient::new(conn, Duration::from_secs(5));

        let log = ShipmentLog::default();
        let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
        coordinator.spawn_consumer(log.clone()).unwrap();

        let sent = ids(n);
        for id in &sent {
            coordinator.send(id).await.unwrap();
        }
        let summary = coordinator.close().await.unwrap();

        assert_eq!(summary.sent, n);
        assert_eq!(summary.received, n);
        assert_eq!(*log.ids.lock(), sent, "n = {}", n);
        assert!(*log.ended.lock());
    }
}

#[tokio::test]
async fn test_close_waits_for_delayed_final_response() {
    let server = OrderServer {
        final_delay: Duration::from_millis(300),
        final_shipment: true,
        ..OrderServer::default()
    };
    let (conn, _server) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_secs(5));

    let log = ShipmentLog::default();
    let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
    coordinator.spawn_consumer(log.clone()).unwrap();
    coordinator.send(&"102".to_string()).await.unwrap();
    coordinator.send(&"103".to_string()).await.unwrap();

    let started = Instant::now();
    let summary = coordinator.close().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(summary.received, 3);
    assert_eq!(summary.state, BidiState::FullyClosed);
    // the final shipment repeats both orders
    assert_eq!(*log.ids.lock(), vec!["102", "103", "102", "103"]);
}

#[tokio::test]
async fn test_transport_error_still_fires_rendezvous() {
    let server = OrderServer {
        break_after_shipments: Some(2),
        ..OrderServer::default()
    };
    let (conn, _server) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_secs(30));

    let (mut sender, receiver) = client.process_orders().unwrap().split();
    let log = ShipmentLog::default();
    let consumer = receiver.spawn_consumer(log.clone());

    sender.send(&"102".to_string()).await.unwrap();
    sender.send(&"103".to_string()).await.unwrap();

    // the sender stays open; only the connection failure ends the consumer
    let report = timeout(Duration::from_secs(2), consumer.wait())
        .await
        .expect("rendezvous did not fire")
        .unwrap();

    assert_eq!(report.received, 2);
    assert!(matches!(report.outcome, Err(RpcError::Receive(_))));
    assert!(!*log.ended.lock());
    drop(sender);
}

#[tokio::test]
async fn test_transport_error_reported_by_close() {
    let server = OrderServer {
        break_after_shipments: Some(1),
        ..OrderServer::default()
    };
    let (conn, _server) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_secs(30));

    let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
    coordinator.spawn_consumer(ShipmentLog::default()).unwrap();
    coordinator.send(&"102".to_string()).await.unwrap();

    let result = timeout(Duration::from_secs(2), coordinator.close())
        .await
        .expect("close did not return");
    assert!(result.is_err());
    assert_ne!(coordinator.state(), BidiState::SendHalfClosed);
    assert_ne!(coordinator.state(), BidiState::SendingAndReceiving);
}

#[tokio::test]
async fn test_send_failure_tears_stream_down() {
    let server = OrderServer {
        break_after_shipments: Some(2),
        ..OrderServer::default()
    };
    let (conn, server_task) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_secs(30));

    let log = ShipmentLog::default();
    let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
    coordinator.spawn_consumer(log.clone()).unwrap();
    coordinator.send(&"102".to_string()).await.unwrap();
    coordinator.send(&"103".to_string()).await.unwrap();

    // the server hangs up after its second shipment
    timeout(Duration::from_secs(2), server_task).await.unwrap().unwrap();

    let err = timeout(Duration::from_secs(2), async {
        loop {
            if let Err(e) = coordinator.send(&"104".to_string()).await {
                return e;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("send kept succeeding on a dead connection");

    assert!(matches!(err, RpcError::Send(_)), "{:?}", err);
    assert_eq!(coordinator.state(), BidiState::Cancelled);

    // the consumer task is gone once it has released its observer
    timeout(Duration::from_secs(2), async {
        while Arc::strong_count(&log.ids) > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("consumer task still running");

    let result = timeout(Duration::from_secs(2), coordinator.close())
        .await
        .expect("close did not return");
    assert!(matches!(result, Err(RpcError::InvalidState(_))));
}

#[tokio::test]
async fn test_deadline_unblocks_consumer() {
    let server = OrderServer {
        silent_processing: true,
        ..OrderServer::default()
    };
    let (conn, _server) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_millis(100));

    let (mut sender, receiver) = client.process_orders().unwrap().split();
    let consumer = receiver.spawn_consumer(ShipmentLog::default());
    sender.send(&"102".to_string()).await.unwrap();

    let report = timeout(Duration::from_secs(2), consumer.wait())
        .await
        .expect("consumer parked past the deadline")
        .unwrap();
    assert!(matches!(report.outcome, Err(RpcError::DeadlineExceeded)));
}

#[tokio::test]
async fn test_deadline_cancels_coordinated_call() {
    let server = OrderServer {
        silent_processing: true,
        ..OrderServer::default()
    };
    let (conn, _server) = server.start();
    let client = OrderManagementClient::new(conn, Duration::from_millis(100));

    let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
    coordinator.spawn_consumer(ShipmentLog::default()).unwrap();
    coordinator.send(&"102".to_string()).await.unwrap();

    let result = timeout(Duration::from_secs(2), coordinator.close())
        .await
        .expect("close did not return");
    assert!(matches!(result, Err(RpcError::DeadlineExceeded)));
    assert_eq!(coordinator.state(), BidiState::Cancelled);
    assert!(matches!(
        coordinator.send(&"103".to_string()).await,
        Err(RpcError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_four_items_end_to_end() {
    let (conn, server) = OrderServer::default().start();
    let client = OrderManagementClient::new(conn, Duration::from_secs(5));

    let log = ShipmentLog::default();
    let mut coordinator = BidiCoordinator::new(client.process_orders().unwrap());
    assert_eq!(coordinator.state(), BidiState::Open);

    for id in ["A", "B", "C"] {
        coordinator.send(&id.to_string()).await.unwrap();
    }
    coordinator.spawn_consumer(log.clone()).unwrap();
    assert_eq!(coordinator.state(), BidiState::SendingAndReceiving);

    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.send(&"D".to_string()).await.unwrap();
    coordinator.finish_sending().await.unwrap();
    assert_eq!(coordinator.state(), BidiState::SendHalfClosed);

    let summary = coordinator.close().await.unwrap();
    assert_eq!(summary.state, BidiState::FullyClosed);
    assert_eq!(coordinator.state(), BidiState::FullyClosed);
    assert_eq!((summary.sent, summary.received), (4, 4));

    let counts = log.counts.lock().clone();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{:?}", counts);
    assert_eq!(counts.last(), Some(&4));

    drop(coordinator);
    drop(client);
    let server_log = timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
    assert_eq!(server_log.processed, vec!["A", "B", "C", "D"]);
    assert_eq!(server_log.half_closes(), 1);
    assert_eq!(server_log.cancels(), 0);
}
