//! Durable persistence for the primary record and snapshot file.
//!
//! The synchronization protocol needs exactly one primitive from storage:
//! `write(path, payload)` with atomic replacement. [`LocalPersister`] is the
//! production implementation; tests substitute fault-injecting ones.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::map::ClusterMap;

/// Durable write of configuration and snapshot bytes.
///
/// No partial-write semantics are required beyond atomic file replacement;
/// the protocol treats any failure identically.
pub trait Persister: Send + Sync {
    /// Write `payload` to `path`, replacing any previous content atomically.
    fn write(&self, path: &Path, payload: &[u8]) -> io::Result<()>;
}

/// Filesystem-backed persister.
///
/// Writes go to a temporary file in the destination directory first, then
/// are renamed into place, so a crash mid-write never leaves a truncated
/// record behind.
#[derive(Debug, Default)]
pub struct LocalPersister;

impl Persister for LocalPersister {
    fn write(&self, path: &Path, payload: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), size = payload.len(), "persisted record");
        Ok(())
    }
}

/// The one durable configuration record: the primary's reachable URL.
///
/// Overwritten on every accepted newer snapshot so that a restarting node
/// knows which proxy to contact first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    /// Public URL of the designated primary proxy.
    pub primary_url: String,
}

impl PrimaryRecord {
    /// Encode the record as TOML bytes.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        toml::to_string_pretty(self)
            .map(String::into_bytes)
            .map_err(io::Error::other)
    }

    /// Load a record previously written by [`MapOwner`](crate::MapOwner).
    ///
    /// Returns `None` when no record exists yet.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        toml::from_str(&raw).map(Some).map_err(io::Error::other)
    }
}

/// Where the owner keeps its durable state.
#[derive(Debug, Clone)]
pub struct MapPaths {
    /// Primary record (TOML).
    pub record: PathBuf,
    /// Full cluster-map snapshot (postcard), optional at runtime.
    pub snapshot: PathBuf,
}

impl MapPaths {
    /// Conventional layout under a node's data directory.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            record: data_dir.join("primary.toml"),
            snapshot: data_dir.join("cluster-map.bin"),
        }
    }
}

/// Load the snapshot file written by a previous run, if any.
///
/// The returned map is a *candidate*: feed it back through
/// [`MapOwner::synchronize`](crate::MapOwner::synchronize) so it goes through
/// the same validation and arbitration as a map received from the network.
pub fn load_snapshot(path: &Path) -> io::Result<Option<ClusterMap>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    postcard::from_bytes(&bytes).map(Some).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_persister_writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("record.toml");
        let persister = LocalPersister;

        persister.write(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        persister.write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        // No temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_primary_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.toml");
        let record = PrimaryRecord {
            primary_url: "http://127.0.0.1:4820".to_string(),
        };

        LocalPersister
            .write(&path, &record.to_bytes().unwrap())
            .unwrap();
        let loaded = PrimaryRecord::load(&path).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_primary_record_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PrimaryRecord::load(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_snapshot_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_snapshot(&dir.path().join("absent.bin")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster-map.bin");
        fs::write(&path, b"\xff\xff\xff\xff not a snapshot").unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn test_map_paths_layout() {
        let paths = MapPaths::in_dir("/var/lib/reef");
        assert_eq!(paths.record, PathBuf::from("/var/lib/reef/primary.toml"));
        assert_eq!(
            paths.snapshot,
            PathBuf::from("/var/lib/reef/cluster-map.bin")
        );
    }
}
