//! The wire message and its newline-delimited JSON codec.
//!
//! Framing is the entire protocol: one JSON object per line, no length
//! prefix. Grounded on the teacher's `s2s.rs` newline-delimited JSON links
//! and on `original_source/P2P System/message.py` for field shape and
//! validation order (missing-field check, then per-field type check, then
//! the hop-count cap).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PeerId;

/// Hard cap on `hop_count`, enforced once, here — not duplicated at an
/// application layer (see §9 / DESIGN.md: the original source disagreed
/// between a codec-level cap of 10 and an alert-handler cap of 3).
pub const MAX_HOPS: u32 = 10;

/// Reserved `message_type` values the core peer node handles internally.
/// Anything else is an application type routed through the dispatch
/// registry (§4.7).
pub mod message_type {
    pub const HANDSHAKE: &str = "HANDSHAKE";
    pub const PEER_LIST: &str = "PEER_LIST";
    pub const NETWORK_UPDATE: &str = "NETWORK_UPDATE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const PEST_ALERT: &str = "PEST_ALERT";

    pub fn is_reserved(t: &str) -> bool {
        matches!(t, HANDSHAKE | PEER_LIST | NETWORK_UPDATE)
    }
}

/// A single wire message. Field names and casing match the wire protocol
/// of §6 exactly — this type derives `Serialize`/`Deserialize` directly,
/// no intermediate DTO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub peer_id: PeerId,
    /// Nullable, but the key itself is required (§4.2/§6) — `None` means
    /// "broadcast", not "the sender omitted this field". Plain `Option<T>`
    /// derives would silently default a missing key to `None`, conflating
    /// the two; `deserialize_with` below disables that default and makes
    /// the key presence checked like any other required field.
    #[serde(deserialize_with = "deserialize_required_option")]
    pub target_user_id: Option<PeerId>,
    pub message_type: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub time_stamp: f64,
    pub message_id: String,
    pub hop_count: u32,
    pub path: Vec<PeerId>,
}

/// Deserialize an `Option<T>` field without serde's usual "missing key ->
/// None" shortcut, so the key stays required while its value stays
/// nullable. Attaching any `deserialize_with` to an `Option<T>` field
/// already suppresses that shortcut; this function just does the
/// otherwise-default thing once the key is confirmed present.
fn deserialize_required_option<'de, D>(deserializer: D) -> Result<Option<PeerId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::deserialize(deserializer)
}

fn generate_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl Message {
    /// Construct a freshly-originated message: `message_id` is minted,
    /// `hop_count` starts at 0, and `path` starts as `[peer_id]`.
    pub fn new(
        peer_id: PeerId,
        target_user_id: Option<PeerId>,
        message_type: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let path = vec![peer_id.clone()];
        Self {
            peer_id,
            target_user_id,
            message_type: message_type.into(),
            data,
            time_stamp: now_secs(),
            message_id: generate_message_id(),
            hop_count: 0,
            path,
        }
    }

    /// Record one forwarding hop: increments `hop_count` and appends
    /// `hop_peer` to `path`. `message_id` is left untouched so dedup and
    /// loop suppression keep working across every hop.
    pub fn add_hop(&mut self, hop_peer: &str) {
        self.hop_count += 1;
        self.path.push(hop_peer.to_string());
    }

    /// True once this message is known to have passed through `peer`.
    pub fn has_visited(&self, peer: &str) -> bool {
        self.path.iter().any(|p| p == peer)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hop_count {hop_count} exceeds MAX_HOPS ({MAX_HOPS})")]
    HopLimitExceeded { hop_count: u32 },
    #[error("path is empty or does not start with peer_id")]
    InvalidPath,
}

/// Encode a message as one newline-terminated JSON line.
///
/// Newline is forbidden inside the payload; JSON string escaping already
/// guarantees this (a literal `\n` in any string field is escaped to
/// `\\n` by `serde_json`), so no extra check is needed here.
pub fn encode(m: &Message) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(m).expect("Message always serializes");
    bytes.push(b'\n');
    bytes
}

/// Parse and validate one newline-delimited JSON line (the trailing
/// newline, if present, must already have been stripped by the caller —
/// see `Connection::extract_next`).
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    let m: Message = serde_json::from_str(line)?;
    if m.hop_count > MAX_HOPS {
        return Err(DecodeError::HopLimitExceeded {
            hop_count: m.hop_count,
        });
    }
    if m.path.first() != Some(&m.peer_id) {
        return Err(DecodeError::InvalidPath);
    }
    Ok(m)
}
