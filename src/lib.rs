//! `farmlink-core`: a self-organizing TCP mesh for farm-to-farm alert
//! delivery.
//!
//! Each process is one peer. Peers discover each other transitively via
//! gossip (`PEER_LIST`/`NETWORK_UPDATE`), maintain a routing table from a
//! BFS over the known topology, forward application messages hop by hop
//! along that table, and durably queue messages for addressees that are
//! currently unreachable.
//!
//! The collaborator-facing surface is [`node::NodeHandle`]: `submit`,
//! `broadcast`, `on`, `snapshot`. Everything else in this crate is the
//! machinery behind that handle.

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod message;
pub mod node;
pub mod router;
pub mod store;
pub mod types;

pub use error::NodeError;
pub use message::Message;
pub use node::{NetworkSnapshot, NodeHandle, OutboundMessage, PeerNode};
pub use types::{Endpoint, PeerId};
