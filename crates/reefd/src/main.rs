//! `reefd` — the Reef cluster node daemon.
//!
//! Binary entrypoint that sets up a node's view of the cluster: loads the
//! persisted snapshot as the initial candidate, bootstraps a single-proxy
//! map when asked, and holds the [`MapOwner`] that the (external)
//! distribution layer drives with incoming candidates.
//!
//! # Usage
//!
//! ```text
//! reefd start --id p1 --role proxy --bootstrap   # first proxy of a cluster
//! reefd start --id t1 -c reef.toml               # storage node
//! reefd status                                   # inspect persisted state
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reef_cluster::{ClusterMap, LocalPersister, MapOwner, MapPaths, PrimaryRecord, persist};
use reef_types::{NodeId, NodeRole};
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "reefd", version, about = "Reef distributed storage node daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Reef node.
    Start {
        /// Unique node identifier (overrides `[node] id`).
        #[arg(long, env = "REEF_NODE_ID")]
        id: Option<String>,

        /// Node role: `proxy` or `target` (overrides `[node] role`).
        #[arg(long)]
        role: Option<String>,

        /// Override data directory (useful for running multiple instances).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Bootstrap a fresh cluster with this node as the primary proxy.
        ///
        /// Only meaningful for proxies; without it the node waits for the
        /// distribution layer to deliver a map.
        #[arg(long)]
        bootstrap: bool,
    },

    /// Show the persisted cluster map and primary record.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            id,
            role,
            data_dir,
            bootstrap,
        } => {
            let mut config = CliConfig::load(cli.config.as_deref())?;
            if let Some(id) = id {
                config.node.id = Some(id);
            }
            if let Some(role) = role {
                config.node.role = match role.as_str() {
                    "proxy" => NodeRole::Proxy,
                    "target" => NodeRole::Target,
                    other => bail!("unknown role {other:?}, expected proxy or target"),
                };
            }
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            telemetry::init(&config.log.level);
            run_start(config, bootstrap).await
        }
        Commands::Status => {
            let mut config = CliConfig::load(cli.config.as_deref())?;
            if let Some(dir) = std::env::var_os("REEF_DATA_DIR") {
                config.node.data_dir = PathBuf::from(dir);
            }
            run_status(&config)
        }
    }
}

// -----------------------------------------------------------------------
// start
// -----------------------------------------------------------------------

async fn run_start(config: CliConfig, bootstrap: bool) -> Result<()> {
    let descriptor = Arc::new(config.descriptor()?);
    let paths = MapPaths::in_dir(&config.node.data_dir);
    let owner = Arc::new(MapOwner::new(Arc::new(LocalPersister), paths.clone()));

    info!("starting {descriptor}");

    // Re-adopt the snapshot from the previous run, if any. It goes through
    // the same arbitration as a map pushed from the network; a corrupt or
    // invalid file is reported and skipped, never fatal.
    match persist::load_snapshot(&paths.snapshot) {
        Ok(Some(snapshot)) => {
            info!("loaded snapshot from disk: {snapshot}");
            if let Err(e) = owner.synchronize(snapshot, false, false) {
                warn!(error = %e, "persisted snapshot rejected, starting from scratch");
            }
        }
        Ok(None) => info!("no persisted snapshot, starting from scratch"),
        Err(e) => warn!(error = %e, "failed to read persisted snapshot"),
    }

    if bootstrap {
        if descriptor.role != NodeRole::Proxy {
            bail!("--bootstrap requires a proxy node, this node is a {}", descriptor.role);
        }
        bootstrap_primary(&owner, &descriptor, config.cluster.save_snapshot)?;
    }

    let current = owner.current();
    if current.is_valid() {
        info!(
            "serving with {current}, primary: {}",
            owner.is_primary(&descriptor.id)
        );
    } else {
        info!("no valid cluster map yet, waiting for one from the distribution layer");
    }

    // The map distribution transport plugs in here; the owner is ready to
    // arbitrate whatever it delivers. Until then, idle.
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Publish a fresh single-proxy map with this node as primary.
///
/// Map-edit failures here are invariant violations (duplicate ID or worse)
/// and abort startup: continuing with a known-inconsistent map risks
/// split-brain.
fn bootstrap_primary(
    owner: &MapOwner,
    descriptor: &Arc<reef_types::NodeDescriptor>,
    save_snapshot: bool,
) -> Result<()> {
    let current = owner.current();
    if current.is_valid() {
        info!("cluster already formed ({current}), ignoring --bootstrap");
        return Ok(());
    }

    let mut map = (*current).clone();
    if !map.contains_id(&descriptor.id) {
        map.add_proxy(Arc::clone(descriptor))
            .context("registering self in the cluster map")?;
    }
    map.set_primary(descriptor.id.clone())
        .context("designating self as primary")?;

    owner
        .synchronize(map, save_snapshot, true)
        .context("publishing bootstrap cluster map")?;
    info!("bootstrapped cluster as primary {}", descriptor.id);
    Ok(())
}

// -----------------------------------------------------------------------
// status
// -----------------------------------------------------------------------

fn run_status(config: &CliConfig) -> Result<()> {
    let paths = MapPaths::in_dir(&config.node.data_dir);

    match PrimaryRecord::load(&paths.record)? {
        Some(record) => println!("primary url:  {}", record.primary_url),
        None => println!("primary url:  (no record)"),
    }

    match persist::load_snapshot(&paths.snapshot)? {
        Some(map) => print_map(&map),
        None => println!("cluster map:  (no snapshot)"),
    }
    Ok(())
}

fn print_map(map: &ClusterMap) {
    println!("cluster map:  v{}", map.version());
    println!(
        "primary:      {}",
        map.primary_id().map(NodeId::as_str).unwrap_or("none")
    );
    for proxy in map.proxies() {
        let marks = match (
            map.is_primary(&proxy.id),
            !map.is_electable(&proxy.id),
        ) {
            (true, _) => " [primary]",
            (false, true) => " [non-electable]",
            (false, false) => "",
        };
        println!("  proxy  {} {}{marks}", proxy.id, proxy.public_net);
    }
    for target in map.targets() {
        println!("  target {} {}", target.id, target.public_net);
    }
}
