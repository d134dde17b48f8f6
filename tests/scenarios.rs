//! End-to-end seed scenarios (spec §8: S1-S4, S6). Real loopback TCP
//! links between real [`PeerNode`]s, driven the way
//! `freeq-server/tests/s2s_acceptance.rs` drives two live IRC servers:
//! spawn each node's event loop as its own task, wait for gossip to
//! settle, then assert on what the handle/snapshot surfaces.
//!
//! Each scenario uses its own fixed port range so the suite can run
//! with the default parallel test harness without port collisions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use farmlink_core::message::message_type;
use farmlink_core::node::{NodeHandle, OutboundMessage, PeerNode};
use farmlink_core::Message;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

async fn spawn_node(port: u16) -> (NodeHandle, JoinHandle<()>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let node = PeerNode::new("127.0.0.1", port, dir.path()).await.unwrap();
    let handle = node.handle();
    let task = tokio::spawn(async move {
        let _ = node.run().await;
    });
    // Give the listener a moment to bind before anyone tries to connect.
    tokio::time::sleep(Duration::from_millis(30)).await;
    (handle, task, dir)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

fn capture() -> (Arc<Mutex<Vec<Message>>>, impl Fn(Message) + Send + Sync + 'static) {
    let store = Arc::new(Mutex::new(Vec::new()));
    let store2 = store.clone();
    (store, move |m: Message| store2.lock().unwrap().push(m))
}

/// S1: A-B-C chain. A unicasts to C; C's handler sees the message
/// exactly once, with `path=[A,B]` and `hop_count=1` (B's forward is
/// the only hop — A's own send and C's dispatch do not add one).
#[tokio::test]
async fn s1_unicast_over_two_hops() {
    let (a, task_a, _da) = spawn_node(19101).await;
    let (b, task_b, _db) = spawn_node(19102).await;
    let (c, task_c, _dc) = spawn_node(19103).await;

    b.connect("127.0.0.1", 19101).await.unwrap(); // edge a-b
    c.connect("127.0.0.1", 19102).await.unwrap(); // edge b-c
    settle().await;

    let (received, handler) = capture();
    c.on(message_type::MESSAGE, handler);

    let mut data = serde_json::Map::new();
    data.insert("content".to_string(), json!("hello"));
    a.submit(OutboundMessage::unicast(c.peer_id().to_string(), message_type::MESSAGE, data))
        .await
        .unwrap();
    settle().await;

    let got = received.lock().unwrap();
    assert_eq!(got.len(), 1, "C should receive exactly one message");
    let m = &got[0];
    assert_eq!(m.data.get("content").unwrap(), "hello");
    assert_eq!(m.path, vec![a.peer_id().to_string(), b.peer_id().to_string()]);
    assert_eq!(m.hop_count, 1);

    a.shutdown();
    b.shutdown();
    c.shutdown();
    let _ = tokio::join!(task_a, task_b, task_c);
}

/// S2 / property 8: a message submitted to an unreachable target is
/// queued offline, then delivered (and removed from the queue) once
/// that target's own handshake completes.
#[tokio::test]
async fn s2_offline_delivery_on_reconnect() {
    let (a, task_a, _da) = spawn_node(19111).await;
    let (c, task_c, _dc) = spawn_node(19112).await;

    let (received, handler) = capture();
    c.on(message_type::MESSAGE, handler);

    let mut data = serde_json::Map::new();
    data.insert("content".to_string(), json!("later"));
    a.submit(OutboundMessage::unicast(c.peer_id().to_string(), message_type::MESSAGE, data))
        .await
        .unwrap();
    settle().await;

    assert!(received.lock().unwrap().is_empty(), "C is not yet connected, nothing delivered yet");
    assert_eq!(a.snapshot().await.queue_depth, 1, "message should be queued offline on A");

    // C now connects directly to A — its handshake completing should
    // drain A's offline queue for C.
    c.connect("127.0.0.1", 19111).await.unwrap();
    settle().await;

    let got = received.lock().unwrap();
    assert_eq!(got.len(), 1, "queued message should be delivered after reconnect");
    assert_eq!(got[0].data.get("content").unwrap(), "later");
    assert_eq!(a.snapshot().await.queue_depth, 0, "A's offline queue should be drained");

    a.shutdown();
    c.shutdown();
    let _ = tokio::join!(task_a, task_c);
}

/// S3: ring A-B-C-A. A broadcasts a PEST_ALERT; B and C each dispatch
/// exactly once despite the cycle, and both see the same `message_id`.
#[tokio::test]
async fn s3_broadcast_around_a_ring_has_no_duplicate_delivery() {
    let (a, task_a, _da) = spawn_node(19121).await;
    let (b, task_b, _db) = spawn_node(19122).await;
    let (c, task_c, _dc) = spawn_node(19123).await;

    b.connect("127.0.0.1", 19121).await.unwrap(); // a-b
    c.connect("127.0.0.1", 19122).await.unwrap(); // b-c
    a.connect("127.0.0.1", 19123).await.unwrap(); // c-a, closing the ring
    settle().await;

    let (seen_a, handler_a) = capture();
    a.on(message_type::PEST_ALERT, handler_a);
    let (seen_b, handler_b) = capture();
    b.on(message_type::PEST_ALERT, handler_b);
    let (seen_c, handler_c) = capture();
    c.on(message_type::PEST_ALERT, handler_c);

    let mut data = serde_json::Map::new();
    data.insert("pest_type".to_string(), json!("whitefly"));
    data.insert("pest_count".to_string(), json!(40));
    a.broadcast(message_type::PEST_ALERT, data).await.unwrap();
    settle().await;

    let got_b = seen_b.lock().unwrap();
    let got_c = seen_c.lock().unwrap();
    assert_eq!(got_b.len(), 1, "B should dispatch the alert exactly once");
    assert_eq!(got_c.len(), 1, "C should dispatch the alert exactly once");
    assert_eq!(got_b[0].message_id, got_c[0].message_id);
    assert!(
        seen_a.lock().unwrap().is_empty(),
        "A originated the broadcast and must not dispatch it to its own handlers"
    );

    a.shutdown();
    b.shutdown();
    c.shutdown();
    let _ = tokio::join!(task_a, task_b, task_c);
}

/// S4: when A disconnects, B's routing table drops every route through
/// A and B's known peer-graph no longer carries the edge.
#[tokio::test]
async fn s4_disconnect_prunes_routes() {
    let (a, task_a, _da) = spawn_node(19131).await;
    let (b, task_b, _db) = spawn_node(19132).await;

    b.connect("127.0.0.1", 19131).await.unwrap();
    settle().await;

    assert!(b.snapshot().await.connected.contains(&a.peer_id().to_string()));

    a.shutdown();
    let _ = task_a.await;
    settle().await;

    let snap = b.snapshot().await;
    assert!(
        !snap.connected.contains(&a.peer_id().to_string()),
        "A should no longer be a connected peer of B"
    );
    assert!(
        !snap.routes.values().any(|hop| hop.as_str() == a.peer_id()),
        "no route should use A as a next hop after disconnect"
    );
    assert!(
        !snap.routes.contains_key(a.peer_id()),
        "A should no longer be a routable destination"
    );

    b.shutdown();
    let _ = task_b.await;
}

/// S6: a malformed line on the wire is discarded without closing the
/// link, and a well-formed record that follows it is still processed.
#[tokio::test]
async fn s6_malformed_line_does_not_kill_the_connection() {
    let (a, task_a, _da) = spawn_node(19141).await;

    let mut raw = TcpStream::connect(("127.0.0.1", 19141)).await.unwrap();
    raw.write_all(b"this is not json at all\n").await.unwrap();

    let mut data = serde_json::Map::new();
    data.insert("host".to_string(), json!("127.0.0.1"));
    data.insert("port".to_string(), json!(19999));
    let handshake = Message::new("raw-peer".to_string(), None, message_type::HANDSHAKE, data);
    raw.write_all(&farmlink_core::message::encode(&handshake)).await.unwrap();

    settle().await;

    let snap = a.snapshot().await;
    assert!(
        snap.known.contains(&"raw-peer".to_string()),
        "the well-formed handshake after the garbage line should still be processed"
    );

    // The link is still open: A should still be trying to write its
    // reply/gossip back to us rather than having reset the connection.
    let mut buf = [0u8; 1];
    let peek = tokio::time::timeout(Duration::from_millis(200), raw.read(&mut buf)).await;
    assert!(peek.is_ok(), "connection should still be alive and readable, not reset");

    a.shutdown();
    let _ = task_a.await;
}
