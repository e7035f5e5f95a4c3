//! End-to-end hub tests
//!
//! Whole sessions run on spawned tasks exactly as the WebSocket handlers
//! run them, with channel-fed frame sources standing in for sockets and
//! the outbound queues inspected directly.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use codecollab_hub::config::{HubConfig, RateLimitConfig};
use codecollab_hub::connection_manager::{ConnectionId, DocumentId, OutboundFrame};
use codecollab_hub::hub::{CloseReason, CollabHub, RATE_LIMIT_NOTICE};
use codecollab_hub::notification::NotificationEvent;
use codecollab_hub::websocket::{
    run_document_session, run_notification_session, subscription_reply, Inbound,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A connected client: its inbound feed, its outbound queue and its session task
struct TestClient {
    id: ConnectionId,
    inbound: mpsc::Sender<Inbound>,
    outbound: mpsc::Receiver<OutboundFrame>,
    task: JoinHandle<CloseReason>,
}

impl TestClient {
    async fn send(&self, text: &str) {
        self.inbound
            .send(Inbound::Message(text.to_string()))
            .await
            .expect("session should be running");
    }

    /// Wait for the next outbound frame
    async fn recv(&mut self) -> OutboundFrame {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbound queue closed")
    }

    async fn recv_text(&mut self) -> String {
        match self.recv().await {
            OutboundFrame::Text(text) => text.as_str().to_string(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).expect("frame should be JSON")
    }

    /// Every frame already queued, without waiting
    fn drain(&mut self) -> Vec<OutboundFrame> {
        drain_queue(&mut self.outbound)
    }

    /// Close from the peer side and wait for cleanup
    async fn disconnect(self) -> (CloseReason, mpsc::Receiver<OutboundFrame>) {
        drop(self.inbound);
        let reason = self.task.await.expect("session task panicked");
        (reason, self.outbound)
    }

    /// Fail the transport and wait for cleanup
    async fn fail(self, error: &str) -> (CloseReason, mpsc::Receiver<OutboundFrame>) {
        self.inbound
            .send(Inbound::TransportError(error.to_string()))
            .await
            .expect("session should be running");
        let reason = self.task.await.expect("session task panicked");
        (reason, self.outbound)
    }
}

fn test_hub() -> Arc<CollabHub> {
    Arc::new(CollabHub::new(HubConfig::default(), RateLimitConfig::default()))
}

fn join(hub: &Arc<CollabHub>, document_id: DocumentId) -> TestClient {
    let (tx, outbound) = hub.channel();
    let session = hub.join_document(document_id, tx);
    let id = session.id();
    let (inbound, source) = mpsc::channel(64);
    let task = tokio::spawn(run_document_session(session, source));

    TestClient {
        id,
        inbound,
        outbound,
        task,
    }
}

/// Open a notification connection and consume its greeting
async fn watch(hub: &Arc<CollabHub>, document_id: DocumentId) -> TestClient {
    let (tx, outbound) = hub.channel();
    let session = hub.open_notifications(document_id, tx);
    let id = session.id();
    let (inbound, source) = mpsc::channel(64);
    let task = tokio::spawn(run_notification_session(session, source));

    let mut client = TestClient {
        id,
        inbound,
        outbound,
        task,
    };
    let greeting = client.recv_json().await;
    assert_eq!(
        greeting,
        json!({"type": "connected", "file_id": document_id, "connection_id": id.get()})
    );
    client
}

fn drain_queue(outbound: &mut mpsc::Receiver<OutboundFrame>) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = outbound.try_recv() {
        frames.push(frame);
    }
    frames
}

fn texts(frames: &[OutboundFrame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|frame| frame.as_text().map(str::to_string))
        .collect()
}

fn events(frames: &[OutboundFrame]) -> Vec<Value> {
    texts(frames)
        .iter()
        .map(|text| serde_json::from_str(text).expect("frame should be JSON"))
        .collect()
}

// ============================================================================
// Document channel
// ============================================================================

#[tokio::test]
async fn test_burst_of_ten_passes_and_eleventh_is_dropped() {
    let hub = test_hub();
    let mut peer = join(&hub, 1);
    let sender = join(&hub, 1);

    for i in 0..11 {
        sender.send(&format!("edit-{}", i)).await;
    }
    let (_, mut sender_outbound) = sender.disconnect().await;

    let notices = texts(&drain_queue(&mut sender_outbound));
    assert_eq!(notices, vec![RATE_LIMIT_NOTICE.to_string()]);

    let relayed = texts(&peer.drain());
    assert_eq!(relayed.len(), 10);
    assert_eq!(relayed.first().map(String::as_str), Some("edit-0"));
    assert_eq!(relayed.last().map(String::as_str), Some("edit-9"));
}

#[tokio::test]
async fn test_rate_limit_is_per_connection() {
    let hub = test_hub();
    let mut watcher = join(&hub, 1);
    let a = join(&hub, 1);
    let b = join(&hub, 1);

    for i in 0..10 {
        a.send(&format!("a-{}", i)).await;
        b.send(&format!("b-{}", i)).await;
    }
    let (_, mut a_out) = a.disconnect().await;
    let (_, mut b_out) = b.disconnect().await;

    // Neither sender was limited by the other's traffic
    let a_texts = texts(&drain_queue(&mut a_out));
    let b_texts = texts(&drain_queue(&mut b_out));
    assert!(!a_texts.iter().any(|text| text == RATE_LIMIT_NOTICE));
    assert!(!b_texts.iter().any(|text| text == RATE_LIMIT_NOTICE));
    assert_eq!(texts(&watcher.drain()).len(), 20);
}

#[tokio::test]
async fn test_frames_reach_every_other_editor_but_not_the_sender() {
    let hub = test_hub();
    let mut a = join(&hub, 5);
    let mut b = join(&hub, 5);
    let mut c = join(&hub, 5);
    let mut other_doc = join(&hub, 6);

    a.send("fn main() {}").await;

    assert_eq!(b.recv_text().await, "fn main() {}");
    assert_eq!(c.recv_text().await, "fn main() {}");

    // The relay is complete once both peers have it
    assert!(a.drain().is_empty());
    assert!(other_doc.drain().is_empty());
}

#[tokio::test]
async fn test_document_pruned_only_when_last_editor_leaves() {
    let hub = test_hub();
    let a = join(&hub, 8);
    let b = join(&hub, 8);
    let a_id = a.id;
    let b_id = b.id;

    assert_eq!(hub.registry().document_members(8).len(), 2);

    let (reason, _) = a.disconnect().await;
    assert_eq!(reason, CloseReason::PeerClosed);
    assert!(hub.registry().is_document_active(8));
    assert!(!hub.registry().document_members(8).contains(&a_id));
    assert!(hub.registry().document_members(8).contains(&b_id));

    b.disconnect().await;
    assert!(!hub.registry().is_document_active(8));
    assert!(hub.active_documents().is_empty());
    assert_eq!(hub.registry().connection_count(), 0);
    assert_eq!(hub.rate_limiter().tracked_connections(), 0);
}

#[tokio::test]
async fn test_transport_error_closes_actively_and_cleans_up() {
    let hub = test_hub();
    let client = join(&hub, 3);

    let (reason, mut outbound) = client.fail("connection reset").await;

    assert_eq!(reason, CloseReason::TransportError("connection reset".to_string()));
    assert_eq!(outbound.try_recv().ok(), Some(OutboundFrame::Close));
    assert!(!hub.registry().is_document_active(3));
    assert_eq!(hub.registry().connection_count(), 0);
}

#[tokio::test]
async fn test_hello_scenario_without_history_replay() {
    let hub = test_hub();
    let c1 = join(&hub, 42);
    let mut c2 = join(&hub, 42);

    c1.send("hello").await;
    assert_eq!(c2.recv_text().await, "hello");

    c1.disconnect().await;
    let members = hub.registry().document_members(42);
    assert_eq!(members.len(), 1);
    assert!(members.contains(&c2.id));

    let mut c3 = join(&hub, 42);
    tokio::task::yield_now().await;
    assert!(c3.drain().is_empty());

    // Live traffic still flows to the newcomer
    c2.send("world").await;
    assert_eq!(c3.recv_text().await, "world");
}

// ============================================================================
// Notification channel
// ============================================================================

#[tokio::test]
async fn test_join_and_leave_emit_exactly_one_event_each() {
    let hub = test_hub();
    let mut watcher = watch(&hub, 12).await;
    let mut unrelated = watch(&hub, 13).await;

    let editor = join(&hub, 12);
    assert_eq!(
        watcher.recv_json().await,
        json!({"type": "user_joined", "file_id": 12})
    );

    editor.disconnect().await;
    assert_eq!(
        watcher.recv_json().await,
        json!({"type": "user_left", "file_id": 12})
    );

    assert!(watcher.drain().is_empty());
    assert!(unrelated.drain().is_empty());
}

#[tokio::test]
async fn test_events_are_scoped_to_interest_sets() {
    let hub = test_hub();
    let mut only_x = watch(&hub, 100).await;
    let mut x_and_y = watch(&hub, 100).await;
    assert_ok!(hub.subscribe_additional(x_and_y.id, 200));
    let publisher = watch(&hub, 300).await;

    publisher
        .send(r#"{"type": "cursor", "file_id": 200, "line": 4}"#)
        .await;
    assert_eq!(
        x_and_y.recv_json().await,
        json!({"type": "cursor", "file_id": 200, "line": 4})
    );

    publisher
        .send(r#"{"type": "cursor", "file_id": 100, "line": 9}"#)
        .await;
    assert_eq!(
        x_and_y.recv_json().await,
        json!({"type": "cursor", "file_id": 100, "line": 9})
    );
    assert_eq!(
        only_x.recv_json().await,
        json!({"type": "cursor", "file_id": 100, "line": 9})
    );

    // The file 200 event never reached the connection watching only 100
    assert!(only_x.drain().is_empty());
}

#[tokio::test]
async fn test_published_event_defaults_to_home_document() {
    let hub = test_hub();
    let mut listener = watch(&hub, 55).await;
    let mut publisher = watch(&hub, 55).await;

    publisher.send(r#"{"type": "saved"}"#).await;
    assert_eq!(
        listener.recv_json().await,
        json!({"type": "saved", "file_id": 55})
    );

    // Not echoed to the publisher
    assert!(publisher.drain().is_empty());
}

#[tokio::test]
async fn test_malformed_frame_yields_one_error_and_keeps_connection_open() {
    let hub = test_hub();
    let mut sender = watch(&hub, 9).await;
    let mut bystander = watch(&hub, 9).await;

    sender.send("{not json").await;
    assert_eq!(
        sender.recv_json().await,
        json!({"type": "error", "message": "Invalid JSON format"})
    );

    // Still open: the next valid frame goes through
    sender.send(r#"{"type": "ping"}"#).await;
    assert_eq!(
        bystander.recv_json().await,
        json!({"type": "ping", "file_id": 9})
    );

    assert!(sender.drain().is_empty());
    assert!(bystander.drain().is_empty());
    assert_eq!(hub.stats().notifications.malformed_frames, 1);
    assert!(!sender.task.is_finished());
}

#[tokio::test]
async fn test_typeless_object_is_relayed_unchanged() {
    let hub = test_hub();
    let mut listener = watch(&hub, 5).await;
    let mut publisher = watch(&hub, 5).await;

    publisher.send(r#"{"file_id": 5, "cursor": 3}"#).await;
    assert_eq!(
        listener.recv_json().await,
        json!({"file_id": 5, "cursor": 3})
    );

    publisher.send(r#"{"cursor": 4}"#).await;
    assert_eq!(
        listener.recv_json().await,
        json!({"file_id": 5, "cursor": 4})
    );

    // Accepted frames never produce an error for the sender
    assert!(publisher.drain().is_empty());
    assert_eq!(hub.stats().notifications.malformed_frames, 0);
}

#[tokio::test]
async fn test_integral_float_file_id_routes_to_document() {
    let hub = test_hub();
    let mut watcher = watch(&hub, 5).await;
    let publisher = watch(&hub, 7).await;

    publisher.send(r#"{"type": "x", "file_id": 5.0}"#).await;
    assert_eq!(
        watcher.recv_json().await,
        json!({"type": "x", "file_id": 5})
    );
}

#[tokio::test]
async fn test_unroutable_file_id_reaches_nobody() {
    let hub = test_hub();
    let mut watcher = watch(&hub, 5).await;
    let mut publisher = watch(&hub, 7).await;

    publisher.send(r#"{"type": "x", "file_id": "abc"}"#).await;
    publisher.send(r#"{"type": "x", "file_id": 5.5}"#).await;

    // Neither frame is an error, and neither is broadcast globally
    publisher.send(r#"{"type": "marker", "file_id": 5}"#).await;
    assert_eq!(
        watcher.recv_json().await,
        json!({"type": "marker", "file_id": 5})
    );
    assert!(watcher.drain().is_empty());
    assert!(publisher.drain().is_empty());
}

#[tokio::test]
async fn test_subscription_reply_confirms_and_routes() {
    let hub = test_hub();
    let mut watcher = watch(&hub, 100).await;
    let publisher = watch(&hub, 300).await;

    let reply = subscription_reply(&hub, Some(watcher.id), 200);
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({"type": "subscribed", "file_id": 200})
    );

    publisher.send(r#"{"type": "cursor", "file_id": 200}"#).await;
    assert_eq!(
        watcher.recv_json().await,
        json!({"type": "cursor", "file_id": 200})
    );
}

#[tokio::test]
async fn test_subscription_reply_errors() {
    let hub = test_hub();
    let editor = join(&hub, 1);

    let missing = serde_json::to_value(subscription_reply(&hub, None, 2)).unwrap();
    assert_eq!(
        missing,
        json!({"type": "error", "message": "Missing connection_id for subscription"})
    );

    let unknown = serde_json::to_value(subscription_reply(&hub, Some(ConnectionId::new(9999)), 2)).unwrap();
    assert_eq!(unknown["type"], "error");
    assert_eq!(
        unknown["message"],
        "Connection 9999 is not registered for notifications"
    );

    let document = serde_json::to_value(subscription_reply(&hub, Some(editor.id), 2)).unwrap();
    assert_eq!(document["type"], "error");
    assert!(!hub.registry().is_subscriber(editor.id));
}

#[tokio::test]
async fn test_subscribe_additional_rejects_unknown_connections() {
    let hub = test_hub();
    let editor = join(&hub, 1);

    assert_err!(hub.subscribe_additional(ConnectionId::new(9999), 2));
    // Document connections have no interest set
    assert_err!(hub.subscribe_additional(editor.id, 2));
}

#[tokio::test]
async fn test_closed_notification_connection_stops_receiving() {
    let hub = test_hub();
    let watcher = watch(&hub, 21).await;
    let watcher_id = watcher.id;

    let (_, mut outbound) = watcher.disconnect().await;
    assert!(!hub.registry().is_subscriber(watcher_id));

    let result = hub.broadcast_notification(&NotificationEvent::user_joined(21), Some(21), None);
    assert_eq!(result.delivered_to, 0);
    assert!(events(&drain_queue(&mut outbound)).is_empty());
}

#[tokio::test]
async fn test_global_broadcast_reaches_every_watcher() {
    let hub = test_hub();
    let mut a = watch(&hub, 1).await;
    let mut b = watch(&hub, 2).await;

    let event = NotificationEvent::new("maintenance", None);
    let result = hub.broadcast_notification(&event, None, None);
    assert_eq!(result.delivered_to, 2);

    assert_eq!(a.recv_json().await, json!({"type": "maintenance"}));
    assert_eq!(b.recv_json().await, json!({"type": "maintenance"}));
}
