//! # Persistence
//!
//! Crash-safe snapshot files for the replay buffer.
//!
//! File layout:
//!
//! ```text
//! MAGIC (8 bytes) | schema_version (u32 LE) | body_len (u64 LE) | SHA-256(body) | body
//! ```
//!
//! The body is the bincode encoding of a [`Snapshot`]. Files are written to a
//! temporary sibling, synced, then renamed over the destination, so a reader
//! sees either the old snapshot or the new one.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotHeader, SnapshotRecord, SnapshotTrailer, SCHEMA_VERSION};

use crate::error::{ReplayError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Leading bytes of every snapshot file
pub const MAGIC: &[u8; 8] = b"PRBSNAP\0";

const DIGEST_LEN: usize = 32;
const PREAMBLE_LEN: usize = 8 + 4 + 8 + DIGEST_LEN;

/// Encode a snapshot into the framed binary format
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let body = bincode::serialize(snapshot)?;
    let digest = Sha256::digest(&body);

    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&digest);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode and verify a framed snapshot
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(ReplayError::format(format!(
            "truncated preamble: {} bytes",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(ReplayError::format("not a replay buffer snapshot"));
    }

    let (version, rest) = rest.split_at(4);
    let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
    if version != SCHEMA_VERSION {
        return Err(ReplayError::format(format!(
            "unsupported schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }

    let (len, rest) = rest.split_at(8);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(len);
    let body_len = u64::from_le_bytes(len_bytes);

    let (digest, body) = rest.split_at(DIGEST_LEN);
    if body.len() as u64 != body_len {
        return Err(ReplayError::format(format!(
            "body length {} does not match declared {}",
            body.len(),
            body_len
        )));
    }
    if Sha256::digest(body).as_slice() != digest {
        return Err(ReplayError::format("checksum mismatch"));
    }

    let snapshot: Snapshot = bincode::deserialize(body)
        .map_err(|e| ReplayError::format(format!("corrupt body: {}", e)))?;
    if snapshot.header.schema_version != version {
        return Err(ReplayError::format("header schema version disagrees with preamble"));
    }
    Ok(snapshot)
}

/// Atomically write a snapshot file
pub fn save_snapshot(snapshot: &Snapshot, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(snapshot)?;
    let tmp = temp_path(path);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(
        "Saved snapshot with {} experiences ({} bytes) to {}",
        snapshot.records.len(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

/// Read and verify a snapshot file
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let snapshot = decode(&bytes)?;
    info!(
        "Loaded snapshot with {} experiences from {}",
        snapshot.records.len(),
        path.display()
    );
    Ok(snapshot)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            header: SnapshotHeader {
                schema_version: SCHEMA_VERSION,
                capacity: 4,
                state_dim: 2,
                alpha: 0.6,
                beta_start: 0.4,
                beta_frames: 1000,
                epsilon: 1e-6,
                critical_boost_factor: 4.0,
            },
            records: vec![SnapshotRecord {
                slot: 0,
                generation: 1,
                priority: 2.5,
                inserted_at: 0,
                state: vec![0.1, 0.2],
                action: 1,
                reward: -0.3,
                next_state: vec![0.2, 0.3],
                done: false,
                metadata: None,
            }],
            trailer: SnapshotTrailer {
                write_cursor: 1,
                total_inserted: 1,
                total_sampled: 0,
                sample_calls: 0,
                stale_skipped: 0,
                max_priority_seen: 2.5,
                current_beta: 0.4,
                generations: vec![1, 0, 0, 0],
            },
        }
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("buffer.snap");

        let snapshot = sample_snapshot();
        save_snapshot(&snapshot, &path).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_truncated_artifact() {
        let bytes = encode(&sample_snapshot()).unwrap();

        for cut in [0, 10, PREAMBLE_LEN, bytes.len() - 1] {
            let result = decode(&bytes[..cut]);
            assert!(
                matches!(result, Err(ReplayError::PersistenceFormat(_))),
                "cut at {} accepted",
                cut
            );
        }
    }

    #[test]
    fn test_corrupted_body() {
        let mut bytes = encode(&sample_snapshot()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            decode(&bytes),
            Err(ReplayError::PersistenceFormat(_))
        ));
    }

    #[test]
    fn test_wrong_magic_and_version() {
        let mut bytes = encode(&sample_snapshot()).unwrap();
        bytes[0] = b'X';
        assert!(decode(&bytes).is_err());

        let mut bytes = encode(&sample_snapshot()).unwrap();
        bytes[MAGIC.len()] = 99;
        assert!(matches!(
            decode(&bytes),
            Err(ReplayError::PersistenceFormat(_))
        ));
    }
}
