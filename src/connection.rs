//! Per-link byte-level state (§4.3).
//!
//! Split into a socket-free [`FrameBuffer`] (the testable newline-framing
//! contract: `queue`/`ingest`/`extract_next`) and [`Connection`], which
//! pairs a `FrameBuffer` with a real non-blocking `TcpStream` and the
//! handshake state machine of §4.6.2.
//!
//! Grounded on `original_source/P2P System/connection.py` for the buffer
//! state machine, translated from Python's `None`/`True`/`False` sentinel
//! returns to Rust `Result`/enum returns, and from blocking `selectors` to
//! tokio's non-blocking `try_read`/`try_write`.

use std::io::ErrorKind;

use tokio::net::TcpStream;

use crate::error::NodeError;
use crate::message::{self, Message};
use crate::types::{Endpoint, PeerId};

/// Outbound buffer cap (§4.3, §5). Exceeding it is back-pressure, not an
/// error the connection needs to recover from — the caller stores or
/// drops the message instead.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Per-`read` chunk size (§4.6.1).
pub const READ_CHUNK: usize = 4096;

/// Newline-delimited JSON framing over a pair of byte buffers. Contains
/// no I/O — this is what the framing-tolerance property (§8.2) exercises
/// directly.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the encoded message to the outbound buffer. Fails with
    /// `BufferFull` rather than silently growing past `MAX_BUFFER_SIZE`.
    pub fn queue(&mut self, message: &Message) -> Result<(), NodeError> {
        let bytes = message::encode(message);
        if self.outbound.len() + bytes.len() > MAX_BUFFER_SIZE {
            return Err(NodeError::BufferFull);
        }
        self.outbound.extend_from_slice(&bytes);
        Ok(())
    }

    /// Append raw bytes just read off the socket. Arbitrary split points
    /// are fine — a record may arrive in any number of pieces.
    pub fn ingest(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Pop and parse the next complete line, if any. Malformed lines are
    /// logged and discarded transparently — the caller always either
    /// gets a valid `Message` or learns there is nothing more to extract
    /// right now; it never has to distinguish "bad line" from "no line".
    pub fn extract_next(&mut self) -> Option<Message> {
        loop {
            let newline_at = self.inbound.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.inbound.drain(..=newline_at).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            let text = match std::str::from_utf8(line) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("discarding non-UTF-8 line: {e}");
                    continue;
                }
            };
            match message::decode(text) {
                Ok(m) => return Some(m),
                Err(e) => {
                    tracing::warn!("discarding malformed message: {e}");
                    continue;
                }
            }
        }
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }
}

/// Handshake state of a link (§4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    New,
    Sent,
    Complete,
    Closed,
}

/// Outcome of a non-blocking flush attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushResult {
    FullyDrained,
    Partial,
    Closed,
}

/// One TCP link: the framing buffers plus handshake/identity state.
pub struct Connection {
    pub remote_addr: std::net::SocketAddr,
    /// The endpoint the remote side advertised in its `HANDSHAKE` (its
    /// own listening address, not `remote_addr`, which is an ephemeral
    /// client port on inbound links).
    pub remote_listen_endpoint: Option<Endpoint>,
    pub peer_id: Option<PeerId>,
    pub state: HandshakeState,
    pub frames: FrameBuffer,
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream, remote_addr: std::net::SocketAddr) -> Self {
        Self {
            remote_addr,
            remote_listen_endpoint: None,
            peer_id: None,
            state: HandshakeState::New,
            frames: FrameBuffer::new(),
            stream,
        }
    }

    pub fn queue(&mut self, message: &Message) -> Result<(), NodeError> {
        self.frames.queue(message)
    }

    /// Read up to `READ_CHUNK` bytes non-blockingly. `Ok(0)` means the
    /// peer has reset or closed the link.
    pub fn try_read_chunk(&mut self) -> std::io::Result<usize> {
        let mut buf = [0u8; READ_CHUNK];
        match self.stream.try_read(&mut buf) {
            Ok(n) => {
                if n > 0 {
                    self.frames.ingest(&buf[..n]);
                }
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(usize::MAX),
            Err(e) => Err(e),
        }
    }

    /// Write as much of the outbound buffer as the socket accepts
    /// without blocking.
    pub fn flush_out(&mut self) -> FlushResult {
        loop {
            if self.frames.outbound.is_empty() {
                return FlushResult::FullyDrained;
            }
            match self.stream.try_write(&self.frames.outbound) {
                Ok(0) => return FlushResult::Closed,
                Ok(n) => {
                    self.frames.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return FlushResult::Partial,
                Err(_) => return FlushResult::Closed,
            }
        }
    }
}
