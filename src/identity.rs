//! Stable peer identity, persisted once per `(host, port)`.
//!
//! Grounded on `original_source/peer.py::load_or_create_peer_id`: one file
//! per listening address, read-if-present else generate-and-write. The
//! token itself uses `uuid`'s OS-backed v4 generator truncated to 8 hex
//! characters, matching the original's `uuid.uuid4().hex[:8]`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::NodeError;
use crate::types::PeerId;

fn identity_path(data_dir: &Path, host: &str, port: u16) -> PathBuf {
    data_dir.join(format!("peer_{host}_{port}.id"))
}

fn generate_token() -> String {
    let id = uuid::Uuid::new_v4();
    id.simple().to_string()[..8].to_string()
}

/// Return the stable `PeerId` for `(host, port)`, creating and persisting
/// one on first use. An unreadable-but-present identity file is fatal —
/// the node refuses to start rather than silently switching identity.
pub fn load_or_create(data_dir: &Path, host: &str, port: u16) -> Result<PeerId, NodeError> {
    fs::create_dir_all(data_dir)?;
    let path = identity_path(data_dir, host, port);

    if path.exists() {
        let contents = fs::read_to_string(&path).map_err(|e| {
            tracing::error!(path = %path.display(), "failed to read identity file: {e}");
            e
        })?;
        let id = contents.trim().to_string();
        if id.is_empty() {
            return Err(NodeError::Config(format!(
                "identity file {} is empty",
                path.display()
            )));
        }
        return Ok(id);
    }

    let id = generate_token();
    fs::write(&path, &id)?;
    tracing::info!(peer_id = %id, path = %path.display(), "generated new peer identity");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_persists_id() {
        let dir = tempfile::tempdir().unwrap();
        let id1 = load_or_create(dir.path(), "127.0.0.1", 9001).unwrap();
        assert_eq!(id1.len(), 8);
        let id2 = load_or_create(dir.path(), "127.0.0.1", 9001).unwrap();
        assert_eq!(id1, id2, "second load must return the same id");
    }

    #[test]
    fn distinct_ports_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let a = load_or_create(dir.path(), "127.0.0.1", 9001).unwrap();
        let b = load_or_create(dir.path(), "127.0.0.1", 9002).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_identity_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = identity_path(dir.path(), "127.0.0.1", 9001);
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&path, "").unwrap();
        assert!(load_or_create(dir.path(), "127.0.0.1", 9001).is_err());
    }
}
