//! NodeGroupManager: serves group queries from a periodically refreshed
//! snapshot.
//!
//! # Refresh gate
//!
//! A query rebuilds the snapshot when none exists or the current one is
//! older than the refresh interval; otherwise the cached snapshot answers
//! it. Rebuilds are serialized. A caller that finds a rebuild in flight
//! waits up to `refresh_wait_timeout` for it, then falls back to the
//! previous snapshot. A failed rebuild leaves the previous snapshot (and
//! its age) untouched and the error goes only to the caller that
//! triggered it. Later callers are served the previous snapshot until a
//! full interval has passed since the failure, then the rebuild is retried.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use machinescale_state::{ResourceKind, StateError};

use crate::config::AutoscalerConfig;
use crate::controller::MachineController;
use crate::error::{AnnotationError, AutoscaleError, AutoscaleResult};
use crate::nodegroup::NodeGroup;

/// How a node with a provider ID relates to the scaling groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAssignment {
    Group(NodeGroup),
    /// The node's MachineSet names a MachineDeployment that is missing or
    /// has another uid.
    Dangling { kind: ResourceKind, key: String },
    /// The owning object's annotations do not parse.
    InvalidGroup { group: String, error: AnnotationError },
}

/// Groups, members, and node assignments resolved from one read of the
/// cache.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub groups: Vec<NodeGroup>,
    /// Member provider IDs keyed by group id.
    pub members: HashMap<String, Vec<String>>,
    /// Keyed by provider ID, covering cached Nodes and Machines whose Node
    /// has not been cached yet.
    pub assignments: HashMap<String, NodeAssignment>,
    pub built_at: Instant,
}

impl ClusterSnapshot {
    pub fn group(&self, id: &str) -> Option<&NodeGroup> {
        self.groups.iter().find(|g| g.id() == id)
    }

    pub fn groups_in<'a>(&'a self, namespace: Option<&'a str>) -> impl Iterator<Item = &'a NodeGroup> + 'a {
        self.groups
            .iter()
            .filter(move |g| namespace.is_none_or(|ns| ns.is_empty() || g.namespace() == ns))
    }

    pub fn members_of(&self, id: &str) -> &[String] {
        self.members.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }
}

/// Public query surface over the resolved node groups.
pub struct NodeGroupManager {
    controller: MachineController,
    refresh_interval: Duration,
    wait_timeout: Duration,
    current: RwLock<GateState>,
    /// Held for the duration of a rebuild.
    rebuild: Mutex<()>,
}

#[derive(Debug, Default)]
struct GateState {
    snapshot: Option<Arc<ClusterSnapshot>>,
    /// When the last rebuild failed. Cleared by a successful rebuild.
    failed_at: Option<Instant>,
}

impl NodeGroupManager {
    pub fn new(controller: MachineController, config: &AutoscalerConfig) -> Self {
        Self {
            controller,
            refresh_interval: config.refresh_interval(),
            wait_timeout: config.refresh_wait_timeout(),
            current: RwLock::new(GateState::default()),
            rebuild: Mutex::new(()),
        }
    }

    pub fn controller(&self) -> &MachineController {
        &self.controller
    }

    // ── Refresh gate ───────────────────────────────────────────────

    /// The snapshot to answer from, rebuilding it first if stale.
    pub async fn refresh(&self) -> AutoscaleResult<Arc<ClusterSnapshot>> {
        if let Some(snapshot) = self.fresh_snapshot()? {
            return Ok(snapshot);
        }

        let _guard = match self.rebuild.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("node group refresh in flight, waiting");
                match tokio::time::timeout(self.wait_timeout, self.rebuild.lock()).await {
                    Ok(guard) => guard,
                    Err(_) => {
                        let previous = self.current_snapshot()?;
                        warn!(
                            timeout_ms = self.wait_timeout.as_millis() as u64,
                            fallback = previous.is_some(),
                            "node group refresh wait timed out"
                        );
                        return previous.ok_or(AutoscaleError::RefreshTimeout(self.wait_timeout));
                    }
                }
            }
        };

        // The rebuild we waited for may already have produced a fresh one.
        if let Some(snapshot) = self.fresh_snapshot()? {
            return Ok(snapshot);
        }

        match self.controller.build_snapshot() {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.current.write().map_err(|_| StateError::Poisoned)? = GateState {
                    snapshot: Some(Arc::clone(&snapshot)),
                    failed_at: None,
                };
                info!(
                    groups = snapshot.groups.len(),
                    nodes = snapshot.assignments.len(),
                    "node groups refreshed"
                );
                Ok(snapshot)
            }
            Err(e) => {
                if e.is_consistency_fault() {
                    error!(error = %e, "node group refresh failed");
                } else {
                    warn!(error = %e, "node group refresh failed");
                }
                self.current.write().map_err(|_| StateError::Poisoned)?.failed_at = Some(Instant::now());
                Err(e)
            }
        }
    }

    /// The current snapshot regardless of age, without rebuilding.
    pub fn current_snapshot(&self) -> AutoscaleResult<Option<Arc<ClusterSnapshot>>> {
        Ok(self.current.read().map_err(|_| StateError::Poisoned)?.snapshot.clone())
    }

    /// The snapshot to serve without rebuilding: one built within the
    /// interval, or the previous one while a recent failure holds off
    /// the retry.
    fn fresh_snapshot(&self) -> AutoscaleResult<Option<Arc<ClusterSnapshot>>> {
        let state = self.current.read().map_err(|_| StateError::Poisoned)?;
        let within = |at: Instant| at.elapsed() <= self.refresh_interval;
        Ok(state
            .snapshot
            .as_ref()
            .filter(|s| within(s.built_at) || state.failed_at.is_some_and(|at| within(at)))
            .cloned())
    }

    /// Refresh on every interval tick until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.refresh_interval.as_secs(), "node group refresher started");

        let stop = async {
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {
                    // Failures are already logged and the old snapshot keeps serving.
                    let _ = self.refresh().await;
                }
                _ = &mut stop => {
                    info!("node group refresher shutting down");
                    break;
                }
            }
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Eligible groups in `namespace`, or in every namespace when `None`
    /// or empty.
    pub async fn list_groups(&self, namespace: Option<&str>) -> AutoscaleResult<Vec<NodeGroup>> {
        let snapshot = self.refresh().await?;
        Ok(snapshot.groups_in(namespace).cloned().collect())
    }

    /// The group owning the node with `provider_id`. A Machine whose Node
    /// is not cached yet resolves the same way.
    pub async fn group_for_node(&self, provider_id: &str) -> AutoscaleResult<Option<NodeGroup>> {
        let snapshot = self.refresh().await?;
        match snapshot.assignments.get(provider_id) {
            None => Ok(None),
            Some(NodeAssignment::Group(group)) => Ok(Some(group.clone())),
            Some(NodeAssignment::Dangling { kind, key }) => Err(AutoscaleError::DanglingReference {
                kind: *kind,
                key: key.clone(),
            }),
            Some(NodeAssignment::InvalidGroup { group, error }) => Err(AutoscaleError::InvalidGroup {
                group: group.clone(),
                source: error.clone(),
            }),
        }
    }

    /// Provider IDs of the nodes in `group`. Empty for a group the current
    /// snapshot does not list.
    pub async fn members_of(&self, group: &NodeGroup) -> AutoscaleResult<Vec<String>> {
        let snapshot = self.refresh().await?;
        Ok(snapshot.members_of(&group.id()).to_vec())
    }

    /// Look up a listed group by id.
    pub async fn group(&self, id: &str) -> AutoscaleResult<Option<NodeGroup>> {
        let snapshot = self.refresh().await?;
        Ok(snapshot.group(id).cloned())
    }
}
