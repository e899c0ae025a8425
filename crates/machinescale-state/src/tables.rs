//! Typed per-kind tables for the resource cache.
//!
//! Each kind gets its own [`Table`] keyed by [`ObjectKey`], plus a
//! provider-ID index maintained on every insert and remove. Tables are
//! plain data; locking lives in [`crate::store::ResourceCache`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::*;

/// Index of Nodes by `spec.providerID`.
pub const NODE_PROVIDER_ID_INDEX: &str = "machinescale-nodeProviderIDIndex";

/// Index of Machines by `spec.providerID`.
pub const MACHINE_PROVIDER_ID_INDEX: &str = "machinescale-machineProviderIDIndex";

/// A resource type that can live in the cache.
pub trait CachedResource: Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Name of this kind's provider-ID index, if it has one.
    const PROVIDER_ID_INDEX: Option<&'static str> = None;

    fn key(&self) -> ObjectKey;

    /// Value indexed under `PROVIDER_ID_INDEX`. Empty IDs are never indexed.
    fn index_provider_id(&self) -> Option<&str> {
        None
    }

    fn table(tables: &Tables) -> &Table<Self>;

    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
}

/// Primary store plus provider-ID index for one kind.
#[derive(Debug, Clone)]
pub struct Table<T> {
    objects: BTreeMap<ObjectKey, T>,
    by_provider_id: HashMap<String, BTreeSet<ObjectKey>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            by_provider_id: HashMap::new(),
        }
    }
}

impl<T: CachedResource> Table<T> {
    /// Insert or replace an object, moving its index entry if the provider
    /// ID changed. Returns the previous value.
    pub fn upsert(&mut self, obj: T) -> Option<T> {
        let key = obj.key();
        let provider_id = obj.index_provider_id().map(str::to_owned);
        let previous = self.objects.insert(key.clone(), obj);

        if let Some(old_id) = previous.as_ref().and_then(|p| p.index_provider_id()) {
            unindex(&mut self.by_provider_id, old_id, &key);
        }
        if let Some(id) = provider_id {
            self.by_provider_id.entry(id).or_default().insert(key);
        }
        previous
    }

    /// Remove an object and every index entry pointing at it.
    pub fn remove(&mut self, key: &ObjectKey) -> Option<T> {
        let removed = self.objects.remove(key)?;
        if let Some(id) = removed.index_provider_id() {
            unindex(&mut self.by_provider_id, id, key);
        }
        Some(removed)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&T> {
        self.objects.get(key)
    }

    /// Objects indexed under `provider_id`, in key order.
    pub fn by_provider_id(&self, provider_id: &str) -> Vec<&T> {
        self.by_provider_id
            .get(provider_id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.objects.get(key))
            .collect()
    }

    /// All objects in key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Total number of index entries (for consistency checks).
    pub fn index_len(&self) -> usize {
        self.by_provider_id.values().map(BTreeSet::len).sum()
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<ObjectKey>>, id: &str, key: &ObjectKey) {
    if let Some(keys) = index.get_mut(id) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(id);
        }
    }
}

/// Every table the cache holds. Guarded by a single lock so cross-kind
/// reads see one point in time.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub nodes: Table<Node>,
    pub machines: Table<Machine>,
    pub machine_sets: Table<MachineSet>,
    pub machine_deployments: Table<MachineDeployment>,
}

impl CachedResource for Node {
    const KIND: ResourceKind = ResourceKind::Node;
    const PROVIDER_ID_INDEX: Option<&'static str> = Some(NODE_PROVIDER_ID_INDEX);

    fn key(&self) -> ObjectKey {
        ObjectKey::cluster(self.metadata.name.clone())
    }

    fn index_provider_id(&self) -> Option<&str> {
        Some(self.spec.provider_id.as_str()).filter(|id| !id.is_empty())
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.nodes
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.nodes
    }
}

impl CachedResource for Machine {
    const KIND: ResourceKind = ResourceKind::Machine;
    const PROVIDER_ID_INDEX: Option<&'static str> = Some(MACHINE_PROVIDER_ID_INDEX);

    fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    fn index_provider_id(&self) -> Option<&str> {
        self.provider_id()
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.machines
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.machines
    }
}

impl CachedResource for MachineSet {
    const KIND: ResourceKind = ResourceKind::MachineSet;

    fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.machine_sets
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.machine_sets
    }
}

impl CachedResource for MachineDeployment {
    const KIND: ResourceKind = ResourceKind::MachineDeployment;

    fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    fn table(tables: &Tables) -> &Table<Self> {
        &tables.machine_deployments
    }

    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.machine_deployments
    }
}
