//! Subcommands. Each one renders its answer as a `String` so `main` owns
//! stdout.

pub mod groups;
pub mod members;
pub mod node;

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use machinescale_autoscale::{AutoscalerConfig, CapacityHints, MachineController, NodeGroup, NodeGroupManager};
use machinescale_state::{ResourceCache, ResourceList, StaticFeed};

/// Load configuration and resources, sync the cache, and return a manager
/// ready to answer queries.
pub async fn load(
    config: Option<&Path>,
    resources: &Path,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<NodeGroupManager> {
    let config = match config {
        Some(path) => AutoscalerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AutoscalerConfig::default(),
    };

    let content = std::fs::read_to_string(resources)
        .with_context(|| format!("failed to read {}", resources.display()))?;
    let list: ResourceList = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse resources in {}", resources.display()))?;
    info!(
        nodes = list.nodes.len(),
        machines = list.machines.len(),
        machine_sets = list.machine_sets.len(),
        machine_deployments = list.machine_deployments.len(),
        "loaded resources"
    );

    let controller = MachineController::new(ResourceCache::new(), &config);
    controller.run(&StaticFeed::new(list), shutdown).await?;

    Ok(NodeGroupManager::new(controller, &config))
}

/// Serializable view of a [`NodeGroup`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub target_size: i32,
    pub scale_from_zero: bool,
    #[serde(skip_serializing_if = "CapacitySummary::is_empty")]
    pub capacity: CapacitySummary,
}

#[derive(Debug, Default, Serialize)]
pub struct CapacitySummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
}

impl CapacitySummary {
    fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.pods.is_none()
    }
}

impl From<&CapacityHints> for CapacitySummary {
    fn from(hints: &CapacityHints) -> Self {
        Self {
            cpu: hints.cpu.as_ref().map(ToString::to_string),
            memory: hints.memory.as_ref().map(ToString::to_string),
            pods: hints.pods.as_ref().map(ToString::to_string),
        }
    }
}

impl From<&NodeGroup> for GroupSummary {
    fn from(group: &NodeGroup) -> Self {
        Self {
            id: group.id(),
            kind: group.kind().to_string(),
            namespace: group.namespace().to_string(),
            name: group.name().to_string(),
            min_size: group.min_size(),
            max_size: group.max_size(),
            target_size: group.target_size(),
            scale_from_zero: group.scale_from_zero(),
            capacity: group.capacity().into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    use super::*;

    /// A resources file with one scalable set `a` (two nodes) and one
    /// fixed-size set `b` in namespace `ns`.
    pub const RESOURCES: &str = r#"{
        "nodes": [
            {"metadata": {"name": "n-0"}, "spec": {"providerID": "p-0"}},
            {"metadata": {"name": "n-1"}, "spec": {"providerID": "p-1"}},
            {"metadata": {"name": "n-2"}, "spec": {"providerID": "p-2"}}
        ],
        "machines": [
            {"metadata": {"name": "a-0", "namespace": "ns", "labels": {"set": "a"},
                "ownerReferences": [{"kind": "MachineSet", "name": "a", "uid": "a-uid"}]},
             "spec": {"providerID": "p-0"}},
            {"metadata": {"name": "a-1", "namespace": "ns", "labels": {"set": "a"},
                "ownerReferences": [{"kind": "MachineSet", "name": "a", "uid": "a-uid"}]},
             "status": {"nodeRef": {"kind": "Node", "name": "n-1"}}},
            {"metadata": {"name": "b-0", "namespace": "ns", "labels": {"set": "b"},
                "ownerReferences": [{"kind": "MachineSet", "name": "b", "uid": "b-uid"}]},
             "spec": {"providerID": "p-2"}}
        ],
        "machineSets": [
            {"metadata": {"name": "a", "namespace": "ns", "uid": "a-uid",
                "annotations": {
                    "machine.openshift.io/cluster-api-autoscaler-node-group-min-size": "1",
                    "machine.openshift.io/cluster-api-autoscaler-node-group-max-size": "4",
                    "machine.openshift.io/instance-memory-capacity": "16Gi"
                }},
             "spec": {"replicas": 2, "selector": {"matchLabels": {"set": "a"}}}},
            {"metadata": {"name": "b", "namespace": "ns", "uid": "b-uid",
                "annotations": {
                    "machine.openshift.io/cluster-api-autoscaler-node-group-min-size": "1",
                    "machine.openshift.io/cluster-api-autoscaler-node-group-max-size": "1"
                }},
             "spec": {"replicas": 1, "selector": {"matchLabels": {"set": "b"}}}}
        ]
    }"#;

    pub async fn manager() -> (tempfile::TempDir, NodeGroupManager) {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("resources.json");
        std::fs::write(&path, RESOURCES).unwrap();

        let (_tx, rx) = watch::channel(false);
        let manager = load(None, &path, rx).await.unwrap();
        (dir, manager)
    }
}
