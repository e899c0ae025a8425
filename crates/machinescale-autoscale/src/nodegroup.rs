//! Scaling groups backed by a MachineSet or a MachineDeployment.

use std::fmt;

use machinescale_state::{LabelSelector, MachineDeployment, MachineSet, ObjectMeta, ResourceKind};

use crate::annotations::{self, CapacityHints};
use crate::config::AnnotationKeys;
use crate::error::AnnotationError;

/// The object a [`NodeGroup`] scales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalableResource {
    MachineSet(MachineSet),
    MachineDeployment(MachineDeployment),
}

impl ScalableResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ScalableResource::MachineSet(_) => ResourceKind::MachineSet,
            ScalableResource::MachineDeployment(_) => ResourceKind::MachineDeployment,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ScalableResource::MachineSet(ms) => &ms.metadata,
            ScalableResource::MachineDeployment(md) => &md.metadata,
        }
    }

    pub fn replicas(&self) -> i32 {
        match self {
            ScalableResource::MachineSet(ms) => ms.spec.replicas_or_zero(),
            ScalableResource::MachineDeployment(md) => md.spec.replicas_or_zero(),
        }
    }

    pub fn selector(&self) -> &LabelSelector {
        match self {
            ScalableResource::MachineSet(ms) => &ms.spec.selector,
            ScalableResource::MachineDeployment(md) => &md.spec.selector,
        }
    }
}

impl From<MachineSet> for ScalableResource {
    fn from(ms: MachineSet) -> Self {
        ScalableResource::MachineSet(ms)
    }
}

impl From<MachineDeployment> for ScalableResource {
    fn from(md: MachineDeployment) -> Self {
        ScalableResource::MachineDeployment(md)
    }
}

/// Identifier of the group backed by the object with `meta`.
pub fn group_id(kind: ResourceKind, meta: &ObjectMeta) -> String {
    format!("{kind}/{}/{}", meta.namespace, meta.name)
}

/// A scalable resource together with its parsed annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroup {
    resource: ScalableResource,
    min_size: i32,
    max_size: i32,
    capacity: CapacityHints,
    scale_from_zero: bool,
}

impl NodeGroup {
    /// Parse bounds and capacity hints from the resource's annotations.
    pub fn new(keys: &AnnotationKeys, resource: impl Into<ScalableResource>) -> Result<Self, AnnotationError> {
        let resource = resource.into();
        let annotations = &resource.metadata().annotations;
        let (min_size, max_size) = annotations::scaling_bounds(keys, annotations)?;
        let capacity = annotations::capacity_hints(keys, annotations)?;
        let scale_from_zero = annotations::scale_from_zero_enabled(keys, annotations);

        Ok(Self {
            resource,
            min_size,
            max_size,
            capacity,
            scale_from_zero,
        })
    }

    /// `<kind>/<namespace>/<name>`, unique across both kinds.
    pub fn id(&self) -> String {
        group_id(self.kind(), self.resource.metadata())
    }

    pub fn name(&self) -> &str {
        &self.resource.metadata().name
    }

    pub fn namespace(&self) -> &str {
        &self.resource.metadata().namespace
    }

    pub fn uid(&self) -> &str {
        &self.resource.metadata().uid
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn min_size(&self) -> i32 {
        self.min_size
    }

    pub fn max_size(&self) -> i32 {
        self.max_size
    }

    /// Desired replica count of the backing resource.
    pub fn target_size(&self) -> i32 {
        self.resource.replicas()
    }

    pub fn capacity(&self) -> &CapacityHints {
        &self.capacity
    }

    pub fn scale_from_zero(&self) -> bool {
        self.scale_from_zero
    }

    /// Capacity to assume for a new node when the group has none running.
    /// Only offered when scale-from-zero is enabled.
    pub fn template_capacity(&self) -> Option<&CapacityHints> {
        self.scale_from_zero.then_some(&self.capacity)
    }

    /// True if the bounds leave room to scale at all.
    pub fn can_scale(&self) -> bool {
        self.max_size - self.min_size > 0
    }

    pub fn selector(&self) -> &LabelSelector {
        self.resource.selector()
    }

    pub fn resource(&self) -> &ScalableResource {
        &self.resource
    }
}

impl fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} (min: {}, max: {}, replicas: {})",
            self.kind(),
            self.namespace(),
            self.name(),
            self.min_size,
            self.max_size,
            self.target_size()
        )
    }
}
