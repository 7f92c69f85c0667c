//! Per-node owner of the current cluster map.
//!
//! [`MapOwner`] holds exactly one "current" [`ClusterMap`] reference behind
//! an [`ArcSwap`]: any number of request-handling tasks read it without
//! blocking, while mutation goes through a single serialized path —
//! [`MapOwner::synchronize`] — that validates, arbitrates by version,
//! persists, and only then publishes. Readers holding an older snapshot keep
//! a fully usable value for as long as they need it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use reef_types::NodeId;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::map::ClusterMap;
use crate::persist::{MapPaths, Persister, PrimaryRecord};

/// Outcome of a successful [`MapOwner::synchronize`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The candidate was strictly newer and is now the current snapshot.
    Published,
    /// The candidate was not newer; the current snapshot is unchanged
    /// (idempotent re-delivery, or a tolerated stale candidate).
    Unchanged,
}

/// State mutated only under the synchronization lock.
struct Guarded {
    /// In-memory copy of the durable primary record. Rolled back verbatim
    /// when the durable write fails.
    record: PrimaryRecord,
}

/// Concurrency-safe holder of the current [`ClusterMap`].
///
/// One instance per node, constructed explicitly and handed to every
/// component that needs the topology view — never a process-wide global, so
/// unit tests can run many independent owners side by side.
pub struct MapOwner {
    /// The published snapshot. Starts as the empty version-0 sentinel.
    current: ArcSwap<ClusterMap>,
    /// Serializes clone-modify-publish; never taken by readers.
    guarded: Mutex<Guarded>,
    persister: Arc<dyn Persister>,
    paths: MapPaths,
}

impl MapOwner {
    /// Create an owner with the version-0 sentinel published.
    pub fn new(persister: Arc<dyn Persister>, paths: MapPaths) -> Self {
        Self {
            current: ArcSwap::from_pointee(ClusterMap::new()),
            guarded: Mutex::new(Guarded {
                record: PrimaryRecord::default(),
            }),
            persister,
            paths,
        }
    }

    /// Lock-free read of the most recently published snapshot.
    ///
    /// Before the first publish this is the empty version-0 sentinel, which
    /// reports `is_valid() == false`.
    pub fn current(&self) -> Arc<ClusterMap> {
        self.current.load_full()
    }

    /// Whether `id` is the primary proxy of the current snapshot.
    pub fn is_primary(&self, id: &NodeId) -> bool {
        self.current.load().is_primary(id)
    }

    /// The in-memory primary record (last durably accepted primary URL).
    pub fn primary_record(&self) -> PrimaryRecord {
        self.guarded.lock().record.clone()
    }

    /// Arbitrate a candidate snapshot against the current one.
    ///
    /// The only mutation entry point; at most one call executes at a time.
    ///
    /// 1. Reject candidates that fail [`ClusterMap::is_valid`] — before the
    ///    lock, nothing touched.
    /// 2. Compare versions under the lock: older candidates are an error
    ///    when `strict`, otherwise a no-op; equal versions are a no-op.
    /// 3. For strictly newer candidates, durably rewrite the primary record;
    ///    a failure rolls the in-memory record back and aborts. When
    ///    `save_snapshot` is set, also write the full snapshot — that write
    ///    failing is logged but does not block publication, because the
    ///    primary record alone is what restart-safety requires.
    /// 4. Publish the candidate atomically.
    pub fn synchronize(
        &self,
        candidate: ClusterMap,
        save_snapshot: bool,
        strict: bool,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(primary) = candidate.primary().cloned() else {
            return Err(SyncError::Invalid(candidate.to_string()));
        };

        let mut guarded = self.guarded.lock();

        let current = self.current.load();
        if candidate.version() <= current.version() {
            if strict && candidate.version() < current.version() {
                return Err(SyncError::Downgrade {
                    current: current.version(),
                    candidate: candidate.version(),
                });
            }
            return Ok(SyncOutcome::Unchanged);
        }

        // Durable write of the primary record precedes publication: a node
        // that crashes right after this point restarts knowing the primary.
        let previous = std::mem::replace(
            &mut guarded.record,
            PrimaryRecord {
                primary_url: primary.public_net.url.clone(),
            },
        );
        if let Err(e) = self.write_record(&guarded.record) {
            guarded.record = previous;
            return Err(e);
        }

        if save_snapshot {
            if let Err(e) = self.write_snapshot(&candidate) {
                // Snapshot-file failure alone does not abort: the record
                // write above already secured restart-safety.
                warn!(path = %self.paths.snapshot.display(), error = %e,
                    "failed to write cluster map snapshot");
            }
        }

        info!(version = candidate.version(), primary = %primary.id,
            "publishing {candidate}");
        self.publish(candidate);
        Ok(SyncOutcome::Published)
    }

    /// Atomically install a snapshot as current.
    ///
    /// Warms every descriptor's digest first, so no reader of the new
    /// snapshot ever observes a descriptor lacking its placement
    /// fingerprint. The swap is the single observable state change of the
    /// whole synchronize path.
    fn publish(&self, map: ClusterMap) {
        for node in map.targets().chain(map.proxies()) {
            node.digest();
        }
        self.current.store(Arc::new(map));
    }

    fn write_record(&self, record: &PrimaryRecord) -> Result<(), SyncError> {
        let bytes = record.to_bytes().map_err(|e| SyncError::Persist {
            what: "primary record",
            source: e,
        })?;
        self.persister
            .write(&self.paths.record, &bytes)
            .map_err(|e| SyncError::Persist {
                what: "primary record",
                source: e,
            })
    }

    fn write_snapshot(&self, map: &ClusterMap) -> Result<(), SyncError> {
        let bytes = postcard::to_allocvec(map).map_err(|e| SyncError::Persist {
            what: "cluster map snapshot",
            source: std::io::Error::other(e),
        })?;
        self.persister
            .write(&self.paths.snapshot, &bytes)
            .map_err(|e| SyncError::Persist {
                what: "cluster map snapshot",
                source: e,
            })
    }
}

impl std::fmt::Debug for MapOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapOwner")
            .field("current", &self.current.load().to_string())
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
