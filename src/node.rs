//! The peer node: event loop, protocol state machines, and the
//! collaborator-facing API (§4.6).
//!
//! Grounded on `freeq-server/src/server.rs`'s `SharedState` (one big
//! struct behind `parking_lot::Mutex`/`RwLock` fields, shared via `Arc`
//! between the accept loop and every connection) and on
//! `original_source/peer.py` for the exact protocol transitions
//! (two-way handshake guard, peer-list/network-update fan-out,
//! `cleanup_connection`). Unlike the teacher, which spawns one task per
//! connection with a blocking `read_line`, this module follows spec.md
//! §4.6.1 literally: a single task multiplexes the listener and every
//! live connection's non-blocking reads/writes on a bounded tick,
//! because the single-writer-per-connection invariant (§5) and the
//! testable properties of §8 assume one owner of connection state.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::connection::{Connection, FlushResult, HandshakeState};
use crate::dispatch::Dispatch;
use crate::error::NodeError;
use crate::identity;
use crate::message::{message_type, Message};
use crate::router::Router;
use crate::store::OfflineStore;
use crate::types::{Endpoint, PeerId};

/// How long the event loop waits for listener/timer readiness per
/// iteration before re-scanning every connection (§4.6.1: "bounded
/// timeout (≈ 1 s)"). Kept well under a second so tests complete
/// quickly; the bound, not the exact value, is what the spec requires.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type ConnId = u64;

/// A fully-formed view of the network, for operator inspection
/// (spec.md §6 `snapshot()`).
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    pub connected: Vec<PeerId>,
    pub known: Vec<PeerId>,
    pub routes: BTreeMap<PeerId, PeerId>,
    pub queue_depth: usize,
}

/// What a collaborator wants delivered (§6 `submit`).
pub struct OutboundMessage {
    pub target: Option<PeerId>,
    pub message_type: String,
    pub data: Map<String, Value>,
}

impl OutboundMessage {
    pub fn unicast(target: impl Into<PeerId>, message_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { target: Some(target.into()), message_type: message_type.into(), data }
    }
}

/// Everything the loop and collaborator handles share, guarded the way
/// the teacher guards `SharedState`: coarse `parking_lot` locks around
/// plain data, no async locking in the hot path.
struct Inner {
    next_conn_id: ConnId,
    connections: HashMap<ConnId, Connection>,
    peer_conn: HashMap<PeerId, ConnId>,
    known_peers: BTreeMap<PeerId, Endpoint>,
    seen: HashSet<String>,
    router: Router,
}

pub struct SharedState {
    pub peer_id: PeerId,
    pub listen_endpoint: Endpoint,
    offline: Arc<tokio::sync::Mutex<OfflineStore>>,
    dispatch: RwLock<Dispatch>,
    inner: Mutex<Inner>,
    running: watch::Sender<bool>,
}

/// Cloneable handle collaborators use to talk to a running node
/// (spec.md §6). Mirrors `freeq_sdk::client::ClientHandle`'s role as
/// the thread-safe front door onto server-owned state.
#[derive(Clone)]
pub struct NodeHandle {
    state: Arc<SharedState>,
}

impl NodeHandle {
    /// Route a message as §4.6.5 describes: direct link, else routing
    /// table, else the offline queue. The originator is never a recipient
    /// of its own traffic (§4.6.6) — only a peer that actually receives
    /// this off the wire runs it through local dispatch.
    pub async fn submit(&self, msg: OutboundMessage) -> Result<(), NodeError> {
        let message = Message::new(self.state.peer_id.clone(), msg.target, msg.message_type, msg.data);
        self.state.clone().originate(message).await
    }

    /// Flood `message_type`/`data` to every directly-connected peer
    /// (§4.6.6). As with `submit`, the originating node does not dispatch
    /// its own broadcast to its own handlers.
    pub async fn broadcast(&self, message_type: impl Into<String>, data: Map<String, Value>) -> Result<(), NodeError> {
        let message = Message::new(self.state.peer_id.clone(), None, message_type, data);
        self.state.clone().originate(message).await
    }

    /// Register (or replace) the handler for `message_type`.
    pub fn on<F>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.state.dispatch.write().on(message_type, handler);
    }

    pub async fn snapshot(&self) -> NetworkSnapshot {
        self.state.snapshot().await
    }

    pub fn peer_id(&self) -> &str {
        &self.state.peer_id
    }

    /// Initiate an outbound link to `(host, port)` and send our
    /// `HANDSHAKE` (§4.6.2, initiator path).
    pub async fn connect(&self, host: impl Into<String>, port: u16) -> Result<(), NodeError> {
        self.state.clone().connect_out(host.into(), port).await
    }

    pub fn shutdown(&self) {
        let _ = self.state.running.send(false);
    }
}

pub struct PeerNode {
    state: Arc<SharedState>,
    running_rx: watch::Receiver<bool>,
}

impl PeerNode {
    /// Build a node rooted at `data_dir`, loading (or creating) its
    /// identity and offline store from there (§4.1, §4.4).
    pub async fn new(host: impl Into<String>, port: u16, data_dir: impl Into<PathBuf>) -> Result<Self, NodeError> {
        let host = host.into();
        let data_dir = data_dir.into();
        let peer_id = identity::load_or_create(&data_dir, &host, port)?;
        let store_path = data_dir.join(format!("offline_{host}_{port}.sqlite3"));
        let store = OfflineStore::open(store_path)?;
        let (running_tx, running_rx) = watch::channel(true);

        let state = Arc::new(SharedState {
            peer_id: peer_id.clone(),
            listen_endpoint: Endpoint::new(host, port),
            offline: Arc::new(tokio::sync::Mutex::new(store)),
            dispatch: RwLock::new(Dispatch::new()),
            inner: Mutex::new(Inner {
                next_conn_id: 0,
                connections: HashMap::new(),
                peer_conn: HashMap::new(),
                known_peers: BTreeMap::new(),
                seen: HashSet::new(),
                router: Router::new(peer_id),
            }),
            running: running_tx,
        });

        Ok(Self { state, running_rx })
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle { state: self.state.clone() }
    }

    /// Drive the event loop until `NodeHandle::shutdown` is called
    /// (§4.6.1, §5 "Cancellation and shutdown").
    pub async fn run(mut self) -> Result<(), NodeError> {
        let addr: SocketAddr = format!("{}:{}", self.state.listen_endpoint.host, self.state.listen_endpoint.port)
            .parse()
            .map_err(|e| NodeError::Config(format!("invalid listen address: {e}")))?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(peer_id = %self.state.peer_id, %addr, "peer node listening");

        loop {
            if !*self.running_rx.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => {
                    if let Ok((stream, remote_addr)) = accepted {
                        self.state.accept(stream, remote_addr).await;
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = self.running_rx.changed() => {}
            }
            self.state.clone().poll_connections().await;
        }

        self.state.shutdown_all();
        tracing::info!(peer_id = %self.state.peer_id, "peer node shut down");
        Ok(())
    }
}

impl SharedState {
    async fn accept(&self, stream: TcpStream, remote_addr: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let mut inner = self.inner.lock();
        let id = inner.next_conn_id;
        inner.next_conn_id += 1;
        inner.connections.insert(id, Connection::new(stream, remote_addr));
        tracing::debug!(conn_id = id, %remote_addr, "accepted inbound connection");
    }

    async fn connect_out(self: Arc<Self>, host: String, port: u16) -> Result<(), NodeError> {
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let remote_addr = stream.peer_addr()?;
        let mut conn = Connection::new(stream, remote_addr);

        let handshake = Message::new(
            self.peer_id.clone(),
            None,
            message_type::HANDSHAKE,
            handshake_data(&self.listen_endpoint),
        );
        conn.queue(&handshake)?;
        conn.state = HandshakeState::Sent;

        let mut inner = self.inner.lock();
        let id = inner.next_conn_id;
        inner.next_conn_id += 1;
        inner.connections.insert(id, conn);
        tracing::debug!(conn_id = id, host, port, "outbound connection initiated");
        Ok(())
    }

    /// One pass over every live connection: drain readable bytes,
    /// dispatch complete messages, flush whatever is queued to write,
    /// and clean up anything that closed (§4.6.1 steps 3-4, §4.6.7).
    async fn poll_connections(self: Arc<Self>) {
        let ids: Vec<ConnId> = {
            let inner = self.inner.lock();
            inner.connections.keys().copied().collect()
        };

        for id in ids {
            let mut messages = Vec::new();
            let mut closed = false;

            {
                let mut inner = self.inner.lock();
                if let Some(conn) = inner.connections.get_mut(&id) {
                    loop {
                        match conn.try_read_chunk() {
                            Ok(0) => {
                                closed = true;
                                break;
                            }
                            Ok(n) if n == usize::MAX => break, // would-block
                            Ok(_) => continue,
                            Err(_) => {
                                closed = true;
                                break;
                            }
                        }
                    }
                    while let Some(m) = conn.frames.extract_next() {
                        messages.push(m);
                    }
                }
            }

            for message in messages {
                self.clone().handle_incoming(id, message).await;
            }

            if closed {
                self.clone().close_connection(id).await;
                continue;
            }

            let should_close = {
                let mut inner = self.inner.lock();
                match inner.connections.get_mut(&id) {
                    Some(conn) if conn.frames.has_outbound() => conn.flush_out() == FlushResult::Closed,
                    _ => false,
                }
            };
            if should_close {
                self.clone().close_connection(id).await;
            }
        }
    }

    async fn handle_incoming(self: Arc<Self>, conn_id: ConnId, message: Message) {
        match message.message_type.as_str() {
            message_type::HANDSHAKE => self.handle_handshake(conn_id, message).await,
            message_type::PEER_LIST => self.handle_peer_list(message),
            message_type::NETWORK_UPDATE => self.handle_network_update(conn_id, message),
            _ => self.clone().handle_application(message).await,
        }
    }

    /// §4.6.2: bind the link to a `PeerId`, learn the edge, answer with
    /// our own view, and fan the update out to everyone else already
    /// connected.
    async fn handle_handshake(self: Arc<Self>, conn_id: ConnId, message: Message) {
        let remote = message.peer_id.clone();
        let Some(endpoint) = parse_handshake_data(&message.data) else {
            tracing::warn!(%remote, "handshake missing host/port, ignoring");
            return;
        };

        let is_responder = {
            let mut inner = self.inner.lock();
            inner.known_peers.entry(remote.clone()).or_insert(endpoint);
            inner.peer_conn.insert(remote.clone(), conn_id);
            let was_new = inner
                .connections
                .get(&conn_id)
                .map(|c| c.state == HandshakeState::New)
                .unwrap_or(false);
            if let Some(conn) = inner.connections.get_mut(&conn_id) {
                conn.peer_id = Some(remote.clone());
            }
            inner.router.add_edge(&remote);
            let known: BTreeSet<PeerId> = inner.known_peers.keys().cloned().collect();
            inner.router.recompute(&known);
            was_new
        };

        if is_responder {
            let reply = Message::new(
                self.peer_id.clone(),
                None,
                message_type::HANDSHAKE,
                handshake_data(&self.listen_endpoint),
            );
            self.queue_to(conn_id, &reply);
        }

        let (peer_list, network_update) = {
            let inner = self.inner.lock();
            (
                Message::new(self.peer_id.clone(), None, message_type::PEER_LIST, peer_list_data(&inner.known_peers)),
                Message::new(
                    self.peer_id.clone(),
                    None,
                    message_type::NETWORK_UPDATE,
                    network_update_data(&inner.router.graph_snapshot()),
                ),
            )
        };
        self.queue_to(conn_id, &peer_list);
        self.queue_to(conn_id, &network_update);

        self.rebroadcast_gossip(Some(conn_id));

        {
            let mut inner = self.inner.lock();
            if let Some(conn) = inner.connections.get_mut(&conn_id) {
                conn.state = HandshakeState::Complete;
            }
        }

        self.clone().drain_offline_for(remote, conn_id).await;
    }

    /// §4.6.3: learn any peers we didn't already know, and if we learned
    /// anything, tell everyone else.
    fn handle_peer_list(self: Arc<Self>, message: Message) {
        let remote_known = parse_peer_list_data(&message.data);
        let mut learned_any = false;
        {
            let mut inner = self.inner.lock();
            for (id, endpoint) in remote_known {
                if id == self.peer_id {
                    continue;
                }
                if let std::collections::btree_map::Entry::Vacant(e) = inner.known_peers.entry(id) {
                    e.insert(endpoint);
                    learned_any = true;
                }
            }
            if learned_any {
                let known: BTreeSet<PeerId> = inner.known_peers.keys().cloned().collect();
                inner.router.recompute(&known);
            }
        }
        if learned_any {
            let update = {
                let inner = self.inner.lock();
                Message::new(self.peer_id.clone(), None, message_type::PEER_LIST, peer_list_data(&inner.known_peers))
            };
            self.broadcast_complete(&update, None);
        }
    }

    /// §4.6.4: merge the remote's adjacency view; re-emit with split
    /// horizon (never back to the sender) only if we actually learned
    /// a new edge.
    fn handle_network_update(self: Arc<Self>, sender_conn_id: ConnId, message: Message) {
        let remote_graph = parse_network_update_data(&message.data);
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.router.merge_remote_graph(&remote_graph);
            if changed {
                let known: BTreeSet<PeerId> = inner.known_peers.keys().cloned().collect();
                inner.router.recompute(&known);
            }
            changed
        };
        if changed {
            let update = {
                let inner = self.inner.lock();
                Message::new(
                    self.peer_id.clone(),
                    None,
                    message_type::NETWORK_UPDATE,
                    network_update_data(&inner.router.graph_snapshot()),
                )
            };
            self.broadcast_complete(&update, Some(sender_conn_id));
        }
    }

    /// §4.6.5 / §4.6.6: dedup, then locally dispatch (if the message is
    /// addressed to us or is a broadcast) and/or forward it onward. This
    /// is the only place a broadcast's local handlers run — a node that
    /// merely receives a broadcast off the wire, not one that originated
    /// it (see `originate`, which never reaches here for its own traffic).
    async fn handle_application(self: Arc<Self>, message: Message) {
        let first_seen = {
            let mut inner = self.inner.lock();
            inner.seen.insert(message.message_id.clone())
        };
        if !first_seen {
            return;
        }

        let is_broadcast = message.target_user_id.is_none();
        let is_for_me = message
            .target_user_id
            .as_deref()
            .map(|t| t == self.peer_id)
            .unwrap_or(false);
        if is_broadcast || is_for_me {
            self.dispatch.read().dispatch(message.clone());
        }
        if is_for_me {
            return;
        }

        self.route_or_store(message).await.ok();
    }

    /// A message this node itself originated (`NodeHandle::submit`/
    /// `broadcast`): route it toward its destination without ever
    /// treating this node as one of its own recipients (§4.6.6 — the
    /// emitter of a broadcast is never described as a recipient of it).
    async fn originate(self: Arc<Self>, message: Message) -> Result<(), NodeError> {
        self.route_or_store(message).await
    }

    /// Shared forwarding logic for both self-originated and
    /// wire-received messages: flood a broadcast to every neighbor, or
    /// step a unicast closer to its target, falling back to the offline
    /// queue when neither is reachable. Never performs local dispatch —
    /// callers (`handle_application`) decide that on their own.
    async fn route_or_store(self: Arc<Self>, message: Message) -> Result<(), NodeError> {
        if message.target_user_id.is_none() {
            self.flood_broadcast(&message);
            return Ok(());
        }

        let target = message.target_user_id.clone().unwrap();
        if let Some(conn_id) = self.direct_conn_for(&target) {
            let forwarded = self.relay_copy(&message);
            self.queue_to(conn_id, &forwarded);
            return Ok(());
        }

        let next_hop = { self.inner.lock().router.next_hop(&target).cloned() };
        if let Some(hop) = next_hop {
            if let Some(conn_id) = self.direct_conn_for(&hop) {
                let forwarded = self.relay_copy(&message);
                self.queue_to(conn_id, &forwarded);
                return Ok(());
            }
        }

        self.store_offline(&message).await
    }

    /// A freshly-originated message (`message.peer_id == self.peer_id`)
    /// is sent as-is on its first hop — `path`/`hop_count` already
    /// reflect the originator (§3). Only an actual relay, forwarding on
    /// someone else's behalf, appends itself and increments the count
    /// (§4.6.5, §4.6.6).
    fn relay_copy(&self, message: &Message) -> Message {
        let mut copy = message.clone();
        if message.peer_id != self.peer_id {
            copy.add_hop(&self.peer_id);
        }
        copy
    }

    /// §4.6.6: send to every complete neighbor not already in `path`,
    /// closing the gap the original alert handler left open (§9).
    fn flood_broadcast(&self, message: &Message) {
        let targets: Vec<ConnId> = {
            let inner = self.inner.lock();
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.state == HandshakeState::Complete)
                .filter(|(_, c)| c.peer_id.as_deref().map(|p| !message.has_visited(p)).unwrap_or(false))
                .map(|(id, _)| *id)
                .collect()
        };
        for conn_id in targets {
            let forwarded = self.relay_copy(message);
            self.queue_to(conn_id, &forwarded);
        }
    }

    fn direct_conn_for(&self, peer: &str) -> Option<ConnId> {
        let inner = self.inner.lock();
        let id = *inner.peer_conn.get(peer)?;
        let complete = inner
            .connections
            .get(&id)
            .map(|c| c.state == HandshakeState::Complete)
            .unwrap_or(false);
        complete.then_some(id)
    }

    /// Gossip the current `PEER_LIST`/`NETWORK_UPDATE` to every complete
    /// connection other than `except` (used after a handshake binds a
    /// new edge, §4.6.2).
    fn rebroadcast_gossip(&self, except: Option<ConnId>) {
        let (peer_list, network_update) = {
            let inner = self.inner.lock();
            (
                Message::new(self.peer_id.clone(), None, message_type::PEER_LIST, peer_list_data(&inner.known_peers)),
                Message::new(
                    self.peer_id.clone(),
                    None,
                    message_type::NETWORK_UPDATE,
                    network_update_data(&inner.router.graph_snapshot()),
                ),
            )
        };
        self.broadcast_complete(&peer_list, except);
        self.broadcast_complete(&network_update, except);
    }

    fn broadcast_complete(&self, message: &Message, except: Option<ConnId>) {
        let targets: Vec<ConnId> = {
            let inner = self.inner.lock();
            inner
                .connections
                .iter()
                .filter(|(id, c)| Some(**id) != except && c.state == HandshakeState::Complete)
                .map(|(id, _)| *id)
                .collect()
        };
        for conn_id in targets {
            self.queue_to(conn_id, message);
        }
    }

    fn queue_to(&self, conn_id: ConnId, message: &Message) {
        let mut inner = self.inner.lock();
        if let Some(conn) = inner.connections.get_mut(&conn_id) {
            if let Err(e) = conn.queue(message) {
                tracing::warn!(conn_id, "dropping gossip, outbound buffer full: {e}");
            }
        }
    }

    /// §4.6.2 tail: once a handshake completes, try to flush anything
    /// we'd queued for that peer while it was unreachable. Only the
    /// messages that are actually queued onto the link are removed
    /// from the store (§4.4, §9 bug fix) — a buffer-full failure
    /// leaves the row for the next reachability event to retry.
    async fn drain_offline_for(self: Arc<Self>, target: PeerId, conn_id: ConnId) {
        let pending = match self.pending_for(&target).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(%target, "failed to read offline queue: {e}");
                return;
            }
        };
        for p in pending {
            let message = self.relay_copy(&p.message);
            let queued = {
                let mut inner = self.inner.lock();
                inner
                    .connections
                    .get_mut(&conn_id)
                    .map(|c| c.queue(&message).is_ok())
                    .unwrap_or(false)
            };
            if queued {
                if let Err(e) = self.delete_offline(&message.message_id).await {
                    tracing::warn!("failed to delete delivered offline message: {e}");
                }
            } else if let Err(e) = self.increment_retry(&message.message_id).await {
                tracing::warn!("failed to record offline retry: {e}");
            }
        }
    }

    async fn close_connection(self: Arc<Self>, conn_id: ConnId) {
        let peer_id = {
            let mut inner = self.inner.lock();
            let conn = inner.connections.remove(&conn_id);
            conn.and_then(|c| c.peer_id)
        };

        let Some(peer_id) = peer_id else { return };

        {
            let mut inner = self.inner.lock();
            inner.peer_conn.remove(&peer_id);
            inner.router.remove_peer(&peer_id);
            let known: BTreeSet<PeerId> = inner.known_peers.keys().cloned().collect();
            inner.router.recompute(&known);
        }
        tracing::info!(%peer_id, "peer disconnected, routes recomputed");

        let update = {
            let inner = self.inner.lock();
            Message::new(
                self.peer_id.clone(),
                None,
                message_type::NETWORK_UPDATE,
                network_update_data(&inner.router.graph_snapshot()),
            )
        };
        self.broadcast_complete(&update, None);
    }

    fn shutdown_all(&self) {
        let mut inner = self.inner.lock();
        for (_, mut conn) in inner.connections.drain() {
            while conn.frames.has_outbound() {
                if conn.flush_out() != FlushResult::Partial {
                    break;
                }
            }
        }
    }

    async fn snapshot(&self) -> NetworkSnapshot {
        let (connected, known, routes) = {
            let inner = self.inner.lock();
            let connected = inner
                .connections
                .values()
                .filter(|c| c.state == HandshakeState::Complete)
                .filter_map(|c| c.peer_id.clone())
                .collect();
            let known = inner.known_peers.keys().cloned().collect();
            (connected, known, inner.router.routes())
        };
        let queue_depth = self.all_pending().await.map(|v| v.len()).unwrap_or(0);
        NetworkSnapshot { connected, known, routes, queue_depth }
    }

    async fn all_pending(&self) -> Result<Vec<crate::store::PendingMessage>, NodeError> {
        let offline = self.offline.clone();
        tokio::task::spawn_blocking(move || offline.blocking_lock().all_pending())
            .await
            .map_err(|e| NodeError::Config(format!("offline store task panicked: {e}")))?
    }

    async fn store_offline(&self, message: &Message) -> Result<(), NodeError> {
        let offline = self.offline.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || offline.blocking_lock().store(&message))
            .await
            .map_err(|e| NodeError::Config(format!("offline store task panicked: {e}")))?
    }

    async fn pending_for(&self, target: &str) -> Result<Vec<crate::store::PendingMessage>, NodeError> {
        let offline = self.offline.clone();
        let target = target.to_string();
        tokio::task::spawn_blocking(move || offline.blocking_lock().pending_for(&target))
            .await
            .map_err(|e| NodeError::Config(format!("offline store task panicked: {e}")))?
    }

    async fn delete_offline(&self, message_id: &str) -> Result<(), NodeError> {
        let offline = self.offline.clone();
        let message_id = message_id.to_string();
        tokio::task::spawn_blocking(move || offline.blocking_lock().delete(&message_id))
            .await
            .map_err(|e| NodeError::Config(format!("offline store task panicked: {e}")))?
    }

    async fn increment_retry(&self, message_id: &str) -> Result<u32, NodeError> {
        let offline = self.offline.clone();
        let message_id = message_id.to_string();
        tokio::task::spawn_blocking(move || offline.blocking_lock().increment_retry(&message_id))
            .await
            .map_err(|e| NodeError::Config(format!("offline store task panicked: {e}")))?
    }
}

fn handshake_data(endpoint: &Endpoint) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("host".to_string(), Value::String(endpoint.host.clone()));
    data.insert("port".to_string(), Value::Number(endpoint.port.into()));
    data
}

fn parse_handshake_data(data: &Map<String, Value>) -> Option<Endpoint> {
    let host = data.get("host")?.as_str()?.to_string();
    let port = data.get("port")?.as_u64()? as u16;
    Some(Endpoint::new(host, port))
}

fn peer_list_data(known_peers: &BTreeMap<PeerId, Endpoint>) -> Map<String, Value> {
    known_peers
        .iter()
        .map(|(id, ep)| {
            let mut obj = Map::new();
            obj.insert("host".to_string(), Value::String(ep.host.clone()));
            obj.insert("port".to_string(), Value::Number(ep.port.into()));
            (id.clone(), Value::Object(obj))
        })
        .collect()
}

fn parse_peer_list_data(data: &Map<String, Value>) -> BTreeMap<PeerId, Endpoint> {
    data.iter()
        .filter_map(|(id, v)| {
            let obj = v.as_object()?;
            let host = obj.get("host")?.as_str()?.to_string();
            let port = obj.get("port")?.as_u64()? as u16;
            Some((id.clone(), Endpoint::new(host, port)))
        })
        .collect()
}

fn network_update_data(graph: &BTreeMap<PeerId, BTreeSet<PeerId>>) -> Map<String, Value> {
    let mut data = Map::new();
    let peer_graph: Map<String, Value> = graph
        .iter()
        .map(|(node, neighbors)| {
            let list: Vec<Value> = neighbors.iter().map(|n| Value::String(n.clone())).collect();
            (node.clone(), Value::Array(list))
        })
        .collect();
    data.insert("peer_graph".to_string(), Value::Object(peer_graph));
    data
}

fn parse_network_update_data(data: &Map<String, Value>) -> BTreeMap<PeerId, BTreeSet<PeerId>> {
    let Some(peer_graph) = data.get("peer_graph").and_then(|v| v.as_object()) else {
        return BTreeMap::new();
    };
    peer_graph
        .iter()
        .filter_map(|(node, v)| {
            let list = v.as_array()?;
            let neighbors: BTreeSet<PeerId> = list.iter().filter_map(|n| n.as_str().map(String::from)).collect();
            Some((node.clone(), neighbors))
        })
        .collect()
}
