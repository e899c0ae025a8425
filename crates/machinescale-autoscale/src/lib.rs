//! machinescale-autoscale: maps nodes to MachineSet / MachineDeployment
//! scaling groups.
//!
//! Reads cluster state from a [`machinescale_state::ResourceCache`] and
//! answers three questions for a cluster autoscaler: which groups may be
//! scaled, which group owns a given node, and which nodes belong to a
//! given group.
//!
//! # Resolution
//!
//! ```text
//! Node ──providerID──▶ Machine ──ownerRef(uid)──▶ MachineSet
//!                                                    │
//!                         ownerRef(uid), when enabled ▼
//!                                            MachineDeployment
//! ```
//!
//! A group is eligible when its bounds annotations parse, `max - min > 0`,
//! and it has at least one replica. MachineSets owned by a deployment are
//! never listed on their own.
//!
//! [`NodeGroupManager`] serves queries from a snapshot that is rebuilt at
//! most once per refresh interval (30s by default).

pub mod annotations;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod nodegroup;
pub mod ownership;
pub mod quantity;

pub use annotations::CapacityHints;
pub use config::{AnnotationKeys, AutoscalerConfig};
pub use controller::MachineController;
pub use error::{AnnotationError, AutoscaleError, AutoscaleResult, QuantityError};
pub use manager::{ClusterSnapshot, NodeAssignment, NodeGroupManager};
pub use nodegroup::{NodeGroup, ScalableResource};
pub use quantity::Quantity;
