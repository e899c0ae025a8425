//! machinescale-state: in-memory cache of watched cluster resources.
//!
//! Holds the last-known Nodes, Machines, MachineSets, and
//! MachineDeployments, keyed by `{namespace}/{name}`, with provider-ID
//! indices for Nodes and Machines.
//!
//! # Architecture
//!
//! Each kind lives in a strongly typed [`tables::Table`]; all tables sit
//! behind a single `RwLock` inside [`ResourceCache`], so an object and its
//! index entries change together and cross-kind reads are consistent.
//! Watch subscriptions are applied through [`feed::CacheFeeder`]; the cache
//! tracks which kinds have completed their initial list so callers can
//! wait for readiness.
//!
//! The `ResourceCache` is `Clone` + `Send` + `Sync` (backed by `Arc`) and
//! is passed explicitly to every consumer.

pub mod error;
pub mod feed;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use feed::{CacheFeeder, StaticFeed, WatchEvent, WatchSource};
pub use store::{CacheView, ResourceCache};
pub use tables::CachedResource;
pub use types::*;
