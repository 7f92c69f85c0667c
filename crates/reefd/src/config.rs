//! TOML configuration for the Reef daemon.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use reef_types::{NetInfo, NodeDescriptor, NodeRole};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and addresses.
    pub node: NodeSection,
    /// Cluster map handling.
    pub cluster: ClusterSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Unique, stable node identifier. Required (config file or `--id`).
    pub id: Option<String>,
    /// Node role: `"proxy"` or `"target"`.
    pub role: NodeRole,
    /// Directory for persistent data (primary record, snapshot file).
    pub data_dir: PathBuf,
    /// Protocol for direct URLs (`"http"` or `"https"`).
    pub proto: String,
    /// Client-facing listen address.
    pub public_addr: SocketAddr,
    /// Intra-cluster control address. Defaults to the public address.
    pub control_addr: Option<SocketAddr>,
    /// Intra-cluster data/replication address. Defaults to the public address.
    pub data_addr: Option<SocketAddr>,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".reef"))
            .unwrap_or_else(|| PathBuf::from(".reef"));
        Self {
            id: None,
            role: NodeRole::Target,
            data_dir,
            proto: "http".to_string(),
            public_addr: "0.0.0.0:4820".parse().expect("static addr"),
            control_addr: None,
            data_addr: None,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Whether accepted snapshots are also written to the snapshot file
    /// (in addition to the always-written primary record).
    pub save_snapshot: bool,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            save_snapshot: true,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Build this node's descriptor from the configured identity and
    /// addresses. Unset control/data addresses fall back to the public one.
    pub fn descriptor(&self) -> anyhow::Result<NodeDescriptor> {
        let id = self
            .node
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .context("node id is required (set [node] id or pass --id)")?;
        let net = |addr: SocketAddr| NetInfo::new(&self.node.proto, addr.ip(), addr.port());
        Ok(NodeDescriptor::new(
            id,
            self.node.role,
            net(self.node.public_addr),
            self.node.control_addr.map(net),
            self.node.data_addr.map(net),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[node]
id = "p1"
role = "proxy"
data_dir = "/tmp/reef-test"
proto = "https"
public_addr = "127.0.0.1:5820"
control_addr = "127.0.0.1:5821"
data_addr = "127.0.0.1:5822"

[cluster]
save_snapshot = false

[log]
level = "debug"
"#;
        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.node.id.as_deref(), Some("p1"));
        assert_eq!(config.node.role, NodeRole::Proxy);
        assert_eq!(config.node.data_dir, PathBuf::from("/tmp/reef-test"));
        assert!(!config.cluster.save_snapshot);
        assert_eq!(config.log.level, "debug");

        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.public_net.url, "https://127.0.0.1:5820");
        assert_eq!(descriptor.control_net.port, 5821);
        assert_eq!(descriptor.data_net.port, 5822);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config.node.role, NodeRole::Target);
        assert!(config.cluster.save_snapshot);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.node.public_addr.port(), 4820);
    }

    #[test]
    fn test_descriptor_requires_id() {
        let config = CliConfig::from_toml("").unwrap();
        assert!(config.descriptor().is_err());
    }

    #[test]
    fn test_descriptor_endpoints_default_to_public() {
        let config = CliConfig::from_toml(
            r#"
[node]
id = "t1"
public_addr = "10.0.0.5:4820"
"#,
        )
        .unwrap();
        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.control_net, descriptor.public_net);
        assert_eq!(descriptor.data_net, descriptor.public_net);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reef.toml");
        std::fs::write(
            &path,
            r#"
[node]
id = "t9"
data_dir = "/tmp/reef-t9"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.node.id.as_deref(), Some("t9"));
        assert_eq!(config.node.data_dir, PathBuf::from("/tmp/reef-t9"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.node.role, NodeRole::Target);
    }
}
