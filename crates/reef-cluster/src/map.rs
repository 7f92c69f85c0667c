//! The versioned, immutable cluster membership snapshot.
//!
//! A [`ClusterMap`] aggregates every known [`NodeDescriptor`] plus the
//! designated primary proxy and the non-electable-proxy set. Once published
//! through [`MapOwner`](crate::MapOwner) a map value is never edited again:
//! every mutation starts from [`ClusterMap::clone`], edits the copy, and
//! re-publishes. Versioning is monotonic and incremental — the version is
//! the sole tie-breaker for "which snapshot is newer".

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use reef_types::{NodeDescriptor, NodeId, NodeRole};
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// One immutable, versioned view of cluster membership.
///
/// `BTreeMap`-backed so that serialized snapshots are deterministic:
/// re-encoding the same map always yields the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMap {
    /// Data-plane storage nodes, keyed by ID.
    targets: BTreeMap<NodeId, Arc<NodeDescriptor>>,
    /// Control-plane gateways, keyed by ID.
    proxies: BTreeMap<NodeId, Arc<NodeDescriptor>>,
    /// The proxy currently designated authoritative, if any.
    primary_id: Option<NodeId>,
    /// Proxies excluded from ever becoming primary.
    non_electable: BTreeSet<NodeId>,
    /// Monotonically non-decreasing snapshot version.
    version: u64,
}

impl ClusterMap {
    /// Create an empty map at version 0 (the pre-publish sentinel).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of known targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of known proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Iterate over all target descriptors.
    pub fn targets(&self) -> impl Iterator<Item = &Arc<NodeDescriptor>> {
        self.targets.values()
    }

    /// Iterate over all proxy descriptors.
    pub fn proxies(&self) -> impl Iterator<Item = &Arc<NodeDescriptor>> {
        self.proxies.values()
    }

    /// Look up a node in either role set.
    pub fn get_node(&self, id: &NodeId) -> Option<&Arc<NodeDescriptor>> {
        self.targets.get(id).or_else(|| self.proxies.get(id))
    }

    /// Whether the ID is present in either role set.
    pub fn contains_id(&self, id: &NodeId) -> bool {
        self.targets.contains_key(id) || self.proxies.contains_key(id)
    }

    /// Resolve the designated primary, if it is a known proxy.
    pub fn primary(&self) -> Option<&Arc<NodeDescriptor>> {
        self.primary_id.as_ref().and_then(|id| self.proxies.get(id))
    }

    /// ID of the designated primary, if any.
    pub fn primary_id(&self) -> Option<&NodeId> {
        self.primary_id.as_ref()
    }

    /// A map is valid iff it designates a primary and that primary is a
    /// known proxy.
    pub fn is_valid(&self) -> bool {
        self.primary().is_some()
    }

    /// Whether `id` is the primary of a valid map.
    pub fn is_primary(&self, id: &NodeId) -> bool {
        self.primary().is_some_and(|p| &p.id == id)
    }

    /// Whether the proxy may ever be elected primary.
    pub fn is_electable(&self, id: &NodeId) -> bool {
        !self.non_electable.contains(id)
    }

    // -----------------------------------------------------------------------
    // Structural edits — only ever applied to a clone, never to a published
    // snapshot. Every error here is an invariant violation (see MapError).
    // -----------------------------------------------------------------------

    /// Register a target node. Bumps the version.
    pub fn add_target(&mut self, node: Arc<NodeDescriptor>) -> Result<(), MapError> {
        self.add(node, NodeRole::Target)
    }

    /// Register a proxy node. Bumps the version.
    pub fn add_proxy(&mut self, node: Arc<NodeDescriptor>) -> Result<(), MapError> {
        self.add(node, NodeRole::Proxy)
    }

    fn add(&mut self, node: Arc<NodeDescriptor>, role: NodeRole) -> Result<(), MapError> {
        if node.role != role {
            return Err(MapError::RoleMismatch {
                id: node.id.clone(),
                actual: node.role,
                expected: role,
            });
        }
        // Global uniqueness: an ID must not appear in either role set.
        if self.contains_id(&node.id) {
            return Err(MapError::DuplicateId(node.id.clone()));
        }
        let set = match role {
            NodeRole::Target => &mut self.targets,
            NodeRole::Proxy => &mut self.proxies,
        };
        set.insert(node.id.clone(), node);
        self.version += 1;
        Ok(())
    }

    /// Remove a target node. Bumps the version.
    pub fn remove_target(&mut self, id: &NodeId) -> Result<(), MapError> {
        if self.targets.remove(id).is_none() {
            return Err(MapError::NotPresent {
                id: id.clone(),
                role: NodeRole::Target,
                version: self.version,
            });
        }
        self.version += 1;
        Ok(())
    }

    /// Remove a proxy node. Bumps the version.
    ///
    /// The non-electable mark and, if the proxy was primary, the primary
    /// designation are dropped along with the entry.
    pub fn remove_proxy(&mut self, id: &NodeId) -> Result<(), MapError> {
        if self.proxies.remove(id).is_none() {
            return Err(MapError::NotPresent {
                id: id.clone(),
                role: NodeRole::Proxy,
                version: self.version,
            });
        }
        self.non_electable.remove(id);
        if self.primary_id.as_ref() == Some(id) {
            self.primary_id = None;
        }
        self.version += 1;
        Ok(())
    }

    /// Designate a known proxy as primary. Does not bump the version: the
    /// structural mutation that introduced the proxy already did.
    pub fn set_primary(&mut self, id: NodeId) -> Result<(), MapError> {
        if !self.proxies.contains_key(&id) {
            return Err(MapError::NotPresent {
                id,
                role: NodeRole::Proxy,
                version: self.version,
            });
        }
        self.primary_id = Some(id);
        Ok(())
    }

    /// Exclude a known proxy from primary election.
    pub fn set_non_electable(&mut self, id: NodeId) -> Result<(), MapError> {
        if !self.proxies.contains_key(&id) {
            return Err(MapError::NotPresent {
                id,
                role: NodeRole::Proxy,
                version: self.version,
            });
        }
        self.non_electable.insert(id);
        Ok(())
    }

    /// Additive reconciliation: fold entries known to `self` but missing
    /// from `dst` into `dst`.
    ///
    /// An entry is adopted only when its ID is absent from **both** of
    /// `dst`'s role sets — existing entries are never overwritten and never
    /// change role. `dst`'s version and primary are untouched; the caller
    /// bumps the version once if anything was adopted.
    ///
    /// Returns the number of adopted entries.
    pub fn merge_into(&self, dst: &mut ClusterMap) -> usize {
        let mut adopted = 0;
        for (id, node) in &self.targets {
            if !dst.contains_id(id) {
                dst.targets.insert(id.clone(), Arc::clone(node));
                adopted += 1;
            }
        }
        for (id, node) in &self.proxies {
            if !dst.contains_id(id) {
                dst.proxies.insert(id.clone(), Arc::clone(node));
                adopted += 1;
            }
        }
        adopted
    }

    /// Override the version counter, e.g. after a merge to lift the counter
    /// strictly above both inputs. Plain edits bump it automatically;
    /// monotonicity of *published* versions is enforced by the owner, not
    /// here — an unpublished clone is free to carry any candidate version.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl fmt::Display for ClusterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster map v{} ({} targets, {} proxies, primary: {})",
            self.version,
            self.targets.len(),
            self.proxies.len(),
            self.primary_id
                .as_ref()
                .map(NodeId::as_str)
                .unwrap_or("none"),
        )
    }
}
