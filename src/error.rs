//! Crate-wide error type.
//!
//! Parse errors are deliberately absent here — per §4.2/§7 they are handled
//! entirely at the codec boundary (logged, line discarded) and never
//! propagate past `Codec::decode`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("outbound buffer full")]
    BufferFull,

    #[error("invalid configuration: {0}")]
    Config(String),
}
