//! Small shared value types used across the overlay (§3 Data Model).

use serde::{Deserialize, Serialize};

/// Short opaque string identifying a peer for the lifetime of its
/// listening address. See [`crate::identity`].
pub type PeerId = String;

/// A peer's advertised listening address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
