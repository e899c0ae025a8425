//! ResourceCache: last-known state of the watched resources.
//!
//! All four kinds and their provider-ID indices live behind one
//! `RwLock`, so an upsert or remove updates the primary entry and its
//! index entries as a unit, and a reader holding the lock sees every kind
//! at the same point in time. Everything handed out is a clone; later
//! cache updates are never visible through a returned value.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Thread-safe, cheaply cloneable handle to the resource cache.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

struct Inner {
    tables: RwLock<Tables>,
    /// Kinds whose initial list has been fully delivered.
    synced: watch::Sender<BTreeSet<ResourceKind>>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    /// Create an empty cache with no kind synced.
    pub fn new() -> Self {
        let (synced, _) = watch::channel(BTreeSet::new());
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                synced,
            }),
        }
    }

    fn read_tables(&self) -> StateResult<RwLockReadGuard<'_, Tables>> {
        self.inner.tables.read().map_err(|_| StateError::Poisoned)
    }

    fn write_tables(&self) -> StateResult<RwLockWriteGuard<'_, Tables>> {
        self.inner.tables.write().map_err(|_| StateError::Poisoned)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Insert or update an object and its index entries.
    pub fn upsert<T: CachedResource>(&self, obj: T) -> StateResult<()> {
        let key = obj.key();
        let replaced = {
            let mut tables = self.write_tables()?;
            T::table_mut(&mut tables).upsert(obj).is_some()
        };
        debug!(kind = %T::KIND, %key, replaced, "cache upsert");
        Ok(())
    }

    /// Insert or update any resource, dispatching on its kind.
    pub fn apply(&self, resource: Resource) -> StateResult<()> {
        match resource {
            Resource::Node(n) => self.upsert(n),
            Resource::Machine(m) => self.upsert(m),
            Resource::MachineSet(ms) => self.upsert(ms),
            Resource::MachineDeployment(md) => self.upsert(md),
        }
    }

    /// Remove an object and its index entries. Returns true if it existed.
    pub fn remove<T: CachedResource>(&self, key: &ObjectKey) -> StateResult<bool> {
        let existed = {
            let mut tables = self.write_tables()?;
            T::table_mut(&mut tables).remove(key).is_some()
        };
        debug!(kind = %T::KIND, %key, existed, "cache remove");
        Ok(existed)
    }

    /// Remove an object of the given kind.
    pub fn remove_kind(&self, kind: ResourceKind, key: &ObjectKey) -> StateResult<bool> {
        match kind {
            ResourceKind::Node => self.remove::<Node>(key),
            ResourceKind::Machine => self.remove::<Machine>(key),
            ResourceKind::MachineSet => self.remove::<MachineSet>(key),
            ResourceKind::MachineDeployment => self.remove::<MachineDeployment>(key),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Run `f` against a consistent view of every table.
    ///
    /// The read lock is held for the duration of `f`; keep it free of I/O.
    pub fn read<R>(&self, f: impl FnOnce(&CacheView<'_>) -> R) -> StateResult<R> {
        let tables = self.read_tables()?;
        Ok(f(&CacheView { tables: &tables }))
    }

    /// Get a copy of one object by key.
    pub fn get<T: CachedResource>(&self, key: &ObjectKey) -> StateResult<Option<T>> {
        self.read(|view| view.get::<T>(key))
    }

    /// List copies of every object of one kind, in key order.
    pub fn list<T: CachedResource>(&self) -> StateResult<Vec<T>> {
        self.read(|view| view.list::<T>())
    }

    /// Copies of every object under `provider_id` in the kind's index.
    pub fn list_by_provider_id<T: CachedResource>(&self, provider_id: &str) -> StateResult<Vec<T>> {
        self.read(|view| view.list_by_provider_id::<T>(provider_id))
    }

    /// The single object owning `provider_id`, failing loudly if the index
    /// holds more than one.
    pub fn find_by_provider_id<T: CachedResource>(&self, provider_id: &str) -> StateResult<Option<T>> {
        self.read(|view| view.find_by_provider_id::<T>(provider_id))?
    }

    // ── Sync tracking ──────────────────────────────────────────────

    /// Record that the initial list for `kind` has been fully delivered.
    pub fn mark_synced(&self, kind: ResourceKind) {
        let newly = self.inner.synced.send_if_modified(|synced| synced.insert(kind));
        if newly {
            info!(%kind, "initial list synced");
        }
    }

    pub fn has_synced(&self, kind: ResourceKind) -> bool {
        self.inner.synced.borrow().contains(&kind)
    }

    /// Block until every kind in `kinds` has synced.
    ///
    /// Returns [`StateError::SyncAborted`] as soon as `shutdown` flips to
    /// `true`. A dropped shutdown sender is treated as "never cancelled".
    pub async fn wait_for_sync(
        &self,
        kinds: &[ResourceKind],
        mut shutdown: watch::Receiver<bool>,
    ) -> StateResult<()> {
        let mut synced = self.inner.synced.subscribe();
        let all_synced = |set: &BTreeSet<ResourceKind>| kinds.iter().all(|k| set.contains(k));

        debug!(?kinds, "waiting for caches to sync");
        tokio::select! {
            res = synced.wait_for(all_synced) => {
                // The sender lives in `self`, so this cannot be closed.
                res.map(|_| ()).map_err(|_| self.sync_aborted(kinds))
            }
            _ = async {
                if shutdown.wait_for(|stop| *stop).await.is_err() {
                    std::future::pending::<()>().await;
                }
            } => {
                let err = self.sync_aborted(kinds);
                info!(error = %err, "cache sync wait cancelled");
                Err(err)
            }
        }
    }

    fn sync_aborted(&self, kinds: &[ResourceKind]) -> StateError {
        let synced = self.inner.synced.borrow();
        StateError::SyncAborted {
            pending: kinds
                .iter()
                .copied()
                .filter(|k| !synced.contains(k))
                .collect(),
        }
    }
}

/// Borrowed, consistent view of the cache used for multi-hop lookups.
///
/// Every accessor returns owned copies.
pub struct CacheView<'a> {
    tables: &'a Tables,
}

impl CacheView<'_> {
    pub fn get<T: CachedResource>(&self, key: &ObjectKey) -> Option<T> {
        T::table(self.tables).get(key).cloned()
    }

    pub fn list<T: CachedResource>(&self) -> Vec<T> {
        T::table(self.tables).iter().cloned().collect()
    }

    /// Number of cached objects of one kind.
    pub fn count<T: CachedResource>(&self) -> usize {
        T::table(self.tables).len()
    }

    pub fn list_by_provider_id<T: CachedResource>(&self, provider_id: &str) -> Vec<T> {
        T::table(self.tables)
            .by_provider_id(provider_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Unique lookup through the provider-ID index.
    pub fn find_by_provider_id<T: CachedResource>(&self, provider_id: &str) -> StateResult<Option<T>> {
        let mut found = T::table(self.tables).by_provider_id(provider_id);
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop().cloned()),
            count => {
                let index = T::PROVIDER_ID_INDEX.unwrap_or("provider-id");
                error!(index, %provider_id, count, kind = %T::KIND, "duplicate provider ID in index");
                Err(StateError::DuplicateIndexEntry {
                    index,
                    key: provider_id.to_string(),
                    count,
                })
            }
        }
    }

    /// Machines in `namespace` whose labels satisfy `selector`.
    pub fn machines_matching(&self, namespace: &str, selector: &LabelSelector) -> Vec<Machine> {
        self.tables
            .machines
            .iter()
            .filter(|m| m.metadata.namespace == namespace && selector.matches(&m.metadata.labels))
            .cloned()
            .collect()
    }
}
