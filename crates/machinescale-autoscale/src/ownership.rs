//! Owner-reference resolution: Machine → MachineSet → MachineDeployment.
//!
//! A reference is only followed when the cached parent's uid matches the
//! uid recorded on the child. A name match alone is never enough, since
//! names are reused after delete/recreate.

use machinescale_state::{CacheView, Machine, MachineDeployment, MachineSet, ObjectKey, ObjectMeta, OwnerReference, ResourceKind};

/// First owner reference of `kind` with a non-empty name.
///
/// When several references of the same kind are present the first one
/// wins.
pub fn owner_ref(meta: &ObjectMeta, kind: ResourceKind) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .find(|r| r.kind == kind.as_str() && !r.name.is_empty())
}

pub fn machine_set_ref(machine: &Machine) -> Option<&OwnerReference> {
    owner_ref(&machine.metadata, ResourceKind::MachineSet)
}

pub fn machine_deployment_ref(machine_set: &MachineSet) -> Option<&OwnerReference> {
    owner_ref(&machine_set.metadata, ResourceKind::MachineDeployment)
}

/// True if the owner reference of `kind` on `child` carries `parent`'s uid.
///
/// Only the reference [`owner_ref`] picks is compared; references of other
/// kinds, or later ones of the same kind, never establish ownership.
pub fn is_owned_by(child: &ObjectMeta, parent: &ObjectMeta, kind: ResourceKind) -> bool {
    !parent.uid.is_empty() && owner_ref(child, kind).is_some_and(|r| r.uid == parent.uid)
}

/// Outcome of following one owner reference through the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner<T> {
    /// No owner reference of the expected kind.
    None,
    /// The reference names an object that is absent or has another uid.
    Dangling(ObjectKey),
    Found(T),
}

impl<T> Owner<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Owner::Found(owner) => Some(owner),
            Owner::None | Owner::Dangling(_) => None,
        }
    }
}

/// Resolve the MachineSet that owns `machine`.
pub fn resolve_machine_set(view: &CacheView<'_>, machine: &Machine) -> Owner<MachineSet> {
    let Some(reference) = machine_set_ref(machine) else {
        return Owner::None;
    };
    let key = ObjectKey::new(machine.metadata.namespace.clone(), reference.name.clone());
    match view.get::<MachineSet>(&key) {
        Some(ms) if is_owned_by(&machine.metadata, &ms.metadata, ResourceKind::MachineSet) => Owner::Found(ms),
        _ => Owner::Dangling(key),
    }
}

/// Resolve the MachineDeployment that owns `machine_set`.
pub fn resolve_machine_deployment(view: &CacheView<'_>, machine_set: &MachineSet) -> Owner<MachineDeployment> {
    let Some(reference) = machine_deployment_ref(machine_set) else {
        return Owner::None;
    };
    let key = ObjectKey::new(machine_set.metadata.namespace.clone(), reference.name.clone());
    match view.get::<MachineDeployment>(&key) {
        Some(md) if is_owned_by(&machine_set.metadata, &md.metadata, ResourceKind::MachineDeployment) => Owner::Found(md),
        _ => Owner::Dangling(key),
    }
}

/// The owning MachineSet, or `None` when absent, dangling, or mismatched.
pub fn find_owning_machine_set(view: &CacheView<'_>, machine: &Machine) -> Option<MachineSet> {
    resolve_machine_set(view, machine).found()
}

/// The owning MachineDeployment, or `None` when absent, dangling, or
/// mismatched.
pub fn find_owning_machine_deployment(view: &CacheView<'_>, machine_set: &MachineSet) -> Option<MachineDeployment> {
    resolve_machine_deployment(view, machine_set).found()
}
