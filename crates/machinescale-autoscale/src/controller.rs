//! MachineController: group catalog and node ⇄ group resolution over the
//! resource cache.
//!
//! Every query runs inside a single [`ResourceCache::read`], so a multi-hop
//! lookup (Node → Machine → MachineSet → MachineDeployment) sees one
//! consistent point in time. Problems with one group's annotations are
//! logged and that group is skipped; cache-level faults abort the call.

use std::collections::HashMap;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use machinescale_state::*;

use crate::config::{AnnotationKeys, AutoscalerConfig};
use crate::error::{AutoscaleError, AutoscaleResult};
use crate::manager::{ClusterSnapshot, NodeAssignment};
use crate::nodegroup::{NodeGroup, ScalableResource, group_id};
use crate::ownership::{self, Owner};

/// Resolves scaling groups from cached cluster state.
#[derive(Clone)]
pub struct MachineController {
    cache: ResourceCache,
    keys: AnnotationKeys,
    enable_machine_deployments: bool,
}

impl MachineController {
    pub fn new(cache: ResourceCache, config: &AutoscalerConfig) -> Self {
        Self {
            cache,
            keys: config.annotation_keys(),
            enable_machine_deployments: config.enable_machine_deployments,
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn annotation_keys(&self) -> &AnnotationKeys {
        &self.keys
    }

    /// Kinds that must finish their initial list before queries are served.
    pub fn watched_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds = vec![ResourceKind::Node, ResourceKind::Machine, ResourceKind::MachineSet];
        if self.enable_machine_deployments {
            kinds.push(ResourceKind::MachineDeployment);
        }
        kinds
    }

    /// Subscribe to every watched kind and wait for the initial sync.
    ///
    /// Returns the feeder tasks, which keep applying events until their
    /// channels close or `shutdown` flips to `true`.
    pub async fn run(
        &self,
        source: &dyn WatchSource,
        shutdown: watch::Receiver<bool>,
    ) -> AutoscaleResult<Vec<JoinHandle<StateResult<u64>>>> {
        let kinds = self.watched_kinds();
        let feeder = CacheFeeder::new(self.cache.clone());
        let handles = feeder.spawn_all(source, &kinds, shutdown.clone());

        if let Err(e) = self.cache.wait_for_sync(&kinds, shutdown).await {
            for handle in &handles {
                handle.abort();
            }
            return Err(e.into());
        }
        info!(?kinds, "machine controller synced");
        Ok(handles)
    }

    // ── Catalog ────────────────────────────────────────────────────

    /// All eligible scaling groups, machine-sets first, in key order.
    pub fn node_groups(&self) -> AutoscaleResult<Vec<NodeGroup>> {
        Ok(self.cache.read(|view| self.node_groups_in(view))?)
    }

    pub fn node_groups_in(&self, view: &CacheView<'_>) -> Vec<NodeGroup> {
        let mut groups = Vec::new();

        for ms in view.list::<MachineSet>() {
            if ownership::machine_deployment_ref(&ms).is_some() {
                continue;
            }
            self.push_eligible(&mut groups, ms.into());
        }

        if self.enable_machine_deployments {
            for md in view.list::<MachineDeployment>() {
                self.push_eligible(&mut groups, md.into());
            }
        }

        debug!(count = groups.len(), "enumerated node groups");
        groups
    }

    fn push_eligible(&self, groups: &mut Vec<NodeGroup>, resource: ScalableResource) {
        let id = group_id(resource.kind(), resource.metadata());
        let group = match NodeGroup::new(&self.keys, resource) {
            Ok(group) => group,
            Err(e) => {
                warn!(group = %id, error = %e, "skipping node group with invalid annotations");
                return;
            }
        };
        if !group.can_scale() || group.target_size() <= 0 {
            debug!(group = %id, min = group.min_size(), max = group.max_size(), replicas = group.target_size(), "node group not eligible");
            return;
        }
        groups.push(group);
    }

    // ── Node → group ───────────────────────────────────────────────

    /// The group owning `node`, if any.
    pub fn node_group_for_node(&self, node: &Node) -> AutoscaleResult<Option<NodeGroup>> {
        self.cache.read(|view| self.node_group_for_node_in(view, node))?
    }

    pub fn node_group_for_node_in(&self, view: &CacheView<'_>, node: &Node) -> AutoscaleResult<Option<NodeGroup>> {
        self.node_group_for_provider_id_in(view, &node.spec.provider_id)
    }

    /// The group owning the machine behind `provider_id`. The Node itself
    /// need not be cached.
    pub fn node_group_for_provider_id(&self, provider_id: &str) -> AutoscaleResult<Option<NodeGroup>> {
        self.cache
            .read(|view| self.node_group_for_provider_id_in(view, provider_id))?
    }

    pub fn node_group_for_provider_id_in(
        &self,
        view: &CacheView<'_>,
        provider_id: &str,
    ) -> AutoscaleResult<Option<NodeGroup>> {
        if provider_id.is_empty() {
            return Ok(None);
        }
        let Some(machine) = self.find_machine_by_provider_id_in(view, provider_id)? else {
            return Ok(None);
        };
        let Some(ms) = ownership::find_owning_machine_set(view, &machine) else {
            return Ok(None);
        };

        let resource = if self.enable_machine_deployments && ownership::machine_deployment_ref(&ms).is_some() {
            match ownership::resolve_machine_deployment(view, &ms) {
                Owner::Found(md) => ScalableResource::from(md),
                Owner::Dangling(key) => {
                    warn!(machine_set = %ms.metadata.key(), deployment = %key, "dangling machine deployment reference");
                    return Err(AutoscaleError::DanglingReference {
                        kind: ResourceKind::MachineDeployment,
                        key: key.to_string(),
                    });
                }
                Owner::None => ScalableResource::from(ms),
            }
        } else {
            ScalableResource::from(ms)
        };

        let id = group_id(resource.kind(), resource.metadata());
        let group = NodeGroup::new(&self.keys, resource)
            .map_err(|source| AutoscaleError::InvalidGroup { group: id, source })?;

        if !group.can_scale() {
            return Ok(None);
        }
        Ok(Some(group))
    }

    /// The Machine behind `provider_id`.
    ///
    /// Looks in the machine index first, then falls back to the Node's
    /// machine annotation.
    pub fn find_machine_by_provider_id(&self, provider_id: &str) -> AutoscaleResult<Option<Machine>> {
        self.cache
            .read(|view| self.find_machine_by_provider_id_in(view, provider_id))?
    }

    pub fn find_machine_by_provider_id_in(
        &self,
        view: &CacheView<'_>,
        provider_id: &str,
    ) -> AutoscaleResult<Option<Machine>> {
        if let Some(machine) = view.find_by_provider_id::<Machine>(provider_id)? {
            return Ok(Some(machine));
        }

        let Some(node) = view.find_by_provider_id::<Node>(provider_id)? else {
            return Ok(None);
        };
        let Some(annotation) = node.metadata.annotations.get(&self.keys.machine) else {
            return Ok(None);
        };
        match ObjectKey::parse(annotation) {
            Ok(key) => Ok(view.get::<Machine>(&key)),
            Err(e) => {
                warn!(node = %node.metadata.name, error = %e, "ignoring malformed machine annotation");
                Ok(None)
            }
        }
    }

    // ── Members ────────────────────────────────────────────────────

    /// Provider IDs of the nodes belonging to `group`.
    pub fn members_of(&self, group: &NodeGroup) -> AutoscaleResult<Vec<String>> {
        self.cache.read(|view| self.members_in(view, group))?
    }

    pub fn members_in(&self, view: &CacheView<'_>, group: &NodeGroup) -> AutoscaleResult<Vec<String>> {
        let mut provider_ids = Vec::new();

        for machine in view.machines_matching(group.namespace(), group.selector()) {
            if !self.belongs_to(view, &machine, group) {
                continue;
            }
            if let Some(provider_id) = self.member_node(view, &machine)? {
                provider_ids.push(provider_id);
            }
        }
        Ok(provider_ids)
    }

    /// True if the owner chain of `machine` reaches exactly `group`.
    fn belongs_to(&self, view: &CacheView<'_>, machine: &Machine, group: &NodeGroup) -> bool {
        let Some(ms) = ownership::find_owning_machine_set(view, machine) else {
            return false;
        };
        match group.kind() {
            ResourceKind::MachineDeployment => ownership::find_owning_machine_deployment(view, &ms)
                .is_some_and(|md| md.metadata.uid == group.uid()),
            _ => ms.metadata.uid == group.uid(),
        }
    }

    /// Provider ID of the node realized by `machine`.
    fn member_node(&self, view: &CacheView<'_>, machine: &Machine) -> AutoscaleResult<Option<String>> {
        let name = &machine.metadata.name;

        if let Some(provider_id) = machine.provider_id() {
            if let Some(node) = view.find_by_provider_id::<Node>(provider_id)? {
                return Ok(non_empty(node.spec.provider_id));
            }
        }

        let Some(node_ref) = &machine.status.node_ref else {
            debug!(machine = %name, "machine has no node reference yet");
            return Ok(None);
        };
        if node_ref.kind != ResourceKind::Node.as_str() {
            warn!(machine = %name, kind = %node_ref.kind, "node reference is not a Node");
            return Ok(None);
        }
        match view.get::<Node>(&ObjectKey::cluster(node_ref.name.clone())) {
            Some(node) => Ok(non_empty(node.spec.provider_id)),
            None => {
                debug!(machine = %name, node = %node_ref.name, "referenced node not cached");
                Ok(None)
            }
        }
    }

    // ── Snapshot ───────────────────────────────────────────────────

    /// Resolve groups, members, and node assignments from one consistent
    /// read of the cache.
    pub fn build_snapshot(&self) -> AutoscaleResult<ClusterSnapshot> {
        let built_at = tokio::time::Instant::now();
        self.cache.read(|view| {
            let groups = self.node_groups_in(view);

            let mut members = HashMap::with_capacity(groups.len());
            for group in &groups {
                members.insert(group.id(), self.members_in(view, group)?);
            }

            // Machines come after Nodes so that a Machine whose Node has not
            // been cached yet still resolves.
            let provider_ids = view
                .list::<Node>()
                .into_iter()
                .map(|node| node.spec.provider_id)
                .chain(
                    view.list::<Machine>()
                        .into_iter()
                        .filter_map(|m| m.provider_id().map(str::to_string)),
                );

            let mut assignments = HashMap::new();
            for provider_id in provider_ids {
                if assignments.contains_key(&provider_id) {
                    continue;
                }
                let assignment = match self.node_group_for_provider_id_in(view, &provider_id) {
                    Ok(Some(group)) => NodeAssignment::Group(group),
                    Ok(None) => continue,
                    Err(AutoscaleError::DanglingReference { kind, key }) => NodeAssignment::Dangling { kind, key },
                    Err(AutoscaleError::InvalidGroup { group, source }) => NodeAssignment::InvalidGroup {
                        group,
                        error: source,
                    },
                    Err(e) => return Err(e),
                };
                assignments.insert(provider_id, assignment);
            }

            Ok(ClusterSnapshot {
                groups,
                members,
                assignments,
                built_at,
            })
        })?
    }
}

fn non_empty(provider_id: String) -> Option<String> {
    (!provider_id.is_empty()).then_some(provider_id)
}
