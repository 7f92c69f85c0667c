//! Cluster membership map and its synchronization/ownership protocol.
//!
//! This crate provides:
//!
//! - [`ClusterMap`] — immutable, versioned snapshot of cluster topology.
//! - [`MapOwner`] — per-node holder of the current snapshot with lock-free
//!   reads and a serialized clone-modify-publish mutation path.
//! - [`persist`] — durable-write adapter for the primary record and the
//!   optional snapshot file.
//!
//! Network distribution of snapshots and primary-election voting live in
//! external layers; this crate only arbitrates which already-decided
//! snapshot wins on the local node.

mod error;
mod map;
mod owner;
pub mod persist;


pub use error::{MapError, SyncError};
pub use map::ClusterMap;
pub use owner::{MapOwner, SyncOutcome};
pub use persist::{LocalPersister, MapPaths, Persister, PrimaryRecord};
