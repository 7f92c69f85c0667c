//! Error types for the cluster map and synchronization protocol.

use reef_types::{NodeId, NodeRole};

/// Invariant violations detected while editing a [`ClusterMap`](crate::ClusterMap).
///
/// These indicate a defect in the caller or in the distribution layer, not a
/// runtime condition to recover from. The caller is expected to log and
/// terminate the offending subsystem rather than continue with a
/// known-inconsistent map.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The ID is already present in the map, in either role set.
    #[error("duplicate node id: {0}")]
    DuplicateId(NodeId),

    /// The ID is absent from the role set it was expected in.
    #[error("{role} {id} is not in cluster map v{version}")]
    NotPresent {
        /// The missing node.
        id: NodeId,
        /// The role set that was searched.
        role: NodeRole,
        /// Version of the map at the time of the lookup.
        version: u64,
    },

    /// The descriptor's role does not match the set it was inserted into.
    #[error("node {id} has role {actual}, expected {expected}")]
    RoleMismatch {
        /// The offending node.
        id: NodeId,
        /// Role recorded in the descriptor.
        actual: NodeRole,
        /// Role implied by the operation.
        expected: NodeRole,
    },
}

/// Errors returned by [`MapOwner::synchronize`](crate::MapOwner::synchronize).
///
/// All variants are non-fatal: the current snapshot is left untouched and
/// the node keeps serving with its last good view.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The candidate snapshot failed validation (no primary, or the primary
    /// is not a known proxy).
    #[error("invalid cluster map: {0}")]
    Invalid(String),

    /// The candidate is strictly older than the current snapshot and the
    /// caller requested strict arbitration.
    #[error("attempt to downgrade cluster map v{current} to v{candidate}")]
    Downgrade {
        /// Version currently published on this node.
        current: u64,
        /// Version carried by the rejected candidate.
        candidate: u64,
    },

    /// A durable write failed; in-memory state was rolled back.
    #[error("failed to persist {what}: {source}")]
    Persist {
        /// Which record the write was for.
        what: &'static str,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
}
