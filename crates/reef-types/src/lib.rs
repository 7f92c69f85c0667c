//! Shared types and identifiers for Reef.
//!
//! This crate defines the leaf data entities used across the Reef workspace:
//! node identifiers ([`NodeId`]), roles ([`NodeRole`]), network endpoints
//! ([`NetInfo`]), and the immutable per-member record ([`NodeDescriptor`]).

use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Unique identifier for a cluster node, stable for the node's lifetime.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// NodeRole
// ---------------------------------------------------------------------------

/// Role of a cluster node, immutable once the node is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Control-plane gateway; one proxy is the primary.
    Proxy,
    /// Data-plane storage node.
    Target,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Proxy => f.write_str("proxy"),
            NodeRole::Target => f.write_str("target"),
        }
    }
}

// ---------------------------------------------------------------------------
// NetInfo
// ---------------------------------------------------------------------------

/// One reachable network endpoint of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInfo {
    /// IP address the endpoint listens on.
    pub ip: IpAddr,
    /// Port the endpoint listens on.
    pub port: u16,
    /// Direct URL for the endpoint, `{proto}://{ip}:{port}`.
    pub url: String,
}

impl NetInfo {
    /// Build an endpoint record from protocol, address and port.
    pub fn new(proto: &str, ip: IpAddr, port: u16) -> Self {
        let url = match ip {
            IpAddr::V4(v4) => format!("{proto}://{v4}:{port}"),
            IpAddr::V6(v6) => format!("{proto}://[{v6}]:{port}"),
        };
        Self { ip, port, url }
    }
}

impl fmt::Display for NetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

// ---------------------------------------------------------------------------
// NodeDescriptor
// ---------------------------------------------------------------------------

/// Identity and reachability record for one cluster member.
///
/// A descriptor is created once at registration time and is immutable
/// thereafter: replacing a node's endpoints requires removing and re-adding
/// the ID. Immutability is what makes it safe to share one descriptor, by
/// reference, across any number of cluster-map snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node identifier.
    pub id: NodeId,
    /// Node role, fixed at registration.
    pub role: NodeRole,
    /// Client-facing endpoint.
    pub public_net: NetInfo,
    /// Intra-cluster control endpoint.
    pub control_net: NetInfo,
    /// Intra-cluster data/replication endpoint.
    pub data_net: NetInfo,
    /// Cached placement fingerprint; recomputed on demand, never serialized.
    #[serde(skip)]
    digest: OnceLock<u64>,
}

impl NodeDescriptor {
    /// Create a descriptor. Control and data endpoints fall back to the
    /// public endpoint when not separately configured.
    pub fn new(
        id: impl Into<NodeId>,
        role: NodeRole,
        public_net: NetInfo,
        control_net: Option<NetInfo>,
        data_net: Option<NetInfo>,
    ) -> Self {
        let descriptor = Self {
            id: id.into(),
            role,
            control_net: control_net.unwrap_or_else(|| public_net.clone()),
            data_net: data_net.unwrap_or_else(|| public_net.clone()),
            public_net,
            digest: OnceLock::new(),
        };
        descriptor.digest();
        descriptor
    }

    /// Placement fingerprint: the first 8 bytes of `blake3(id)`.
    ///
    /// Deterministic for a given ID, so descriptors that travel over the
    /// wire (where the cached value is dropped) recompute the same digest.
    pub fn digest(&self) -> u64 {
        *self.digest.get_or_init(|| {
            let hash = blake3::hash(self.id.as_str().as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&hash.as_bytes()[..8]);
            u64::from_le_bytes(prefix)
        })
    }
}

// Identity is defined by the registered fields; the digest cache is derived
// data and must not affect equality.
impl PartialEq for NodeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.role == other.role
            && self.public_net == other.public_net
            && self.control_net == other.control_net
            && self.data_net == other.data_net
    }
}

impl Eq for NodeDescriptor {}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.role, self.id, self.public_net)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn public_net(port: u16) -> NetInfo {
        NetInfo::new("http", IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_node_id_display_and_debug() {
        let id = NodeId::new("t42");
        assert_eq!(id.to_string(), "t42");
        assert_eq!(format!("{id:?}"), "NodeId(t42)");
        assert_eq!(id.as_str(), "t42");
    }

    #[test]
    fn test_net_info_builds_url() {
        let net = public_net(8080);
        assert_eq!(net.url, "http://127.0.0.1:8080");
        assert_eq!(net.port, 8080);
    }

    #[test]
    fn test_net_info_v6_url_is_bracketed() {
        let net = NetInfo::new("https", "::1".parse().unwrap(), 9000);
        assert_eq!(net.url, "https://[::1]:9000");
    }

    #[test]
    fn test_descriptor_endpoints_default_to_public() {
        let node = NodeDescriptor::new("t1", NodeRole::Target, public_net(8080), None, None);
        assert_eq!(node.control_net, node.public_net);
        assert_eq!(node.data_net, node.public_net);
    }

    #[test]
    fn test_descriptor_keeps_distinct_endpoints() {
        let node = NodeDescriptor::new(
            "t1",
            NodeRole::Target,
            public_net(8080),
            Some(public_net(8081)),
            Some(public_net(8082)),
        );
        assert_eq!(node.control_net.port, 8081);
        assert_eq!(node.data_net.port, 8082);
    }

    #[test]
    fn test_digest_deterministic_per_id() {
        let a = NodeDescriptor::new("t1", NodeRole::Target, public_net(8080), None, None);
        let b = NodeDescriptor::new("t1", NodeRole::Target, public_net(9090), None, None);
        let c = NodeDescriptor::new("t2", NodeRole::Target, public_net(8080), None, None);

        // Digest depends solely on the ID, not on endpoints.
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_digest_survives_wire_roundtrip() {
        let node = NodeDescriptor::new("p1", NodeRole::Proxy, public_net(8080), None, None);
        let encoded = postcard::to_allocvec(&node).unwrap();
        let decoded: NodeDescriptor = postcard::from_bytes(&encoded).unwrap();

        // The cache is not serialized; recomputation yields the same value.
        assert_eq!(decoded.digest(), node.digest());
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_descriptor_equality_ignores_digest_cache() {
        let warmed = NodeDescriptor::new("p1", NodeRole::Proxy, public_net(8080), None, None);
        let encoded = postcard::to_allocvec(&warmed).unwrap();
        let cold: NodeDescriptor = postcard::from_bytes(&encoded).unwrap();
        assert_eq!(warmed, cold);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(NodeRole::Proxy.to_string(), "proxy");
        assert_eq!(NodeRole::Target.to_string(), "target");
    }
}
