//! Domain types for the watched cluster resources.
//!
//! These mirror the subset of the Node / Machine / MachineSet /
//! MachineDeployment objects the resolver needs. Field names follow the
//! Kubernetes camelCase wire names so fixtures and feeds can carry JSON
//! straight from the API server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{StateError, StateResult};

// ── Kinds and keys ─────────────────────────────────────────────────

/// The four resource kinds held by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Node,
    Machine,
    MachineSet,
    MachineDeployment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Node,
        ResourceKind::Machine,
        ResourceKind::MachineSet,
        ResourceKind::MachineDeployment,
    ];

    /// The `kind` string used in owner and object references.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Node => "Node",
            ResourceKind::Machine => "Machine",
            ResourceKind::MachineSet => "MachineSet",
            ResourceKind::MachineDeployment => "MachineDeployment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: `{namespace}/{name}`, or just `{name}` for cluster-scoped
/// objects (Nodes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    /// Parse a `namespace/name` (or bare `name`) key.
    pub fn parse(s: &str) -> StateResult<Self> {
        let key = match s.split_once('/') {
            Some((ns, name)) => Self::new(ns, name),
            None => Self::cluster(s),
        };
        if key.name.is_empty() || key.name.contains('/') {
            return Err(StateError::InvalidKey(s.to_string()));
        }
        Ok(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// ── Metadata ──────────────────────────────────────────────────────

/// Reference from a child object to the object that created it.
///
/// Identity is `uid`; names are reused after delete/recreate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

/// Loose reference to another object (used by `Machine.status.nodeRef`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Equality-based label selector (`matchLabels`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
}

impl LabelSelector {
    /// True if every selector term is present in `labels`. An empty
    /// selector matches everything.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

// ── Node ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Provider-assigned instance identifier; empty when not yet set.
    #[serde(default, rename = "providerID")]
    pub provider_id: String,
}

// ── Machine ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MachineSpec,
    #[serde(default)]
    pub status: MachineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// The Node this machine realized, once it has joined the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,
}

impl Machine {
    /// The provider ID, if set and non-empty.
    pub fn provider_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|id| !id.is_empty())
    }
}

// ── MachineSet / MachineDeployment ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSet {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ScalableSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDeployment {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ScalableSpec,
}

/// Spec shared by MachineSets and MachineDeployments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalableSpec {
    /// Desired replica count; absent means zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: LabelSelector,
}

impl ScalableSpec {
    pub fn replicas_or_zero(&self) -> i32 {
        self.replicas.unwrap_or(0)
    }
}

// ── Tagged union ──────────────────────────────────────────────────

/// Any one watched object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Node(Node),
    Machine(Machine),
    MachineSet(MachineSet),
    MachineDeployment(MachineDeployment),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Node(_) => ResourceKind::Node,
            Resource::Machine(_) => ResourceKind::Machine,
            Resource::MachineSet(_) => ResourceKind::MachineSet,
            Resource::MachineDeployment(_) => ResourceKind::MachineDeployment,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Node(n) => &n.metadata,
            Resource::Machine(m) => &m.metadata,
            Resource::MachineSet(ms) => &ms.metadata,
            Resource::MachineDeployment(md) => &md.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

/// A full listing of every watched kind, as delivered by an initial list
/// or loaded from a fixture file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub machine_sets: Vec<MachineSet>,
    #[serde(default)]
    pub machine_deployments: Vec<MachineDeployment>,
}

impl ResourceList {
    /// All objects of one kind, wrapped as [`Resource`].
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<Resource> {
        match kind {
            ResourceKind::Node => self.nodes.iter().cloned().map(Resource::Node).collect(),
            ResourceKind::Machine => self.machines.iter().cloned().map(Resource::Machine).collect(),
            ResourceKind::MachineSet => self
                .machine_sets
                .iter()
                .cloned()
                .map(Resource::MachineSet)
                .collect(),
            ResourceKind::MachineDeployment => self
                .machine_deployments
                .iter()
                .cloned()
                .map(Resource::MachineDeployment)
                .collect(),
        }
    }
}
