//! Watch feed plumbing: bridges a subscription source into the cache.
//!
//! A [`WatchSource`] hands out one channel per resource kind. Each channel
//! carries the kind's initial list, then an [`WatchEvent::InitialListDone`]
//! marker, then incremental add/update/delete events. [`CacheFeeder`]
//! drains those channels into a [`ResourceCache`].

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::StateResult;
use crate::store::ResourceCache;
use crate::types::*;

/// One event from a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An object was listed, added, or updated.
    Applied(Resource),
    /// An object was deleted.
    Deleted { kind: ResourceKind, key: ObjectKey },
    /// The initial list for this kind has been fully delivered.
    InitialListDone(ResourceKind),
}

/// A source of watch events, one subscription per resource kind.
///
/// Transport and encoding are the implementor's concern; the cache only
/// sees decoded [`WatchEvent`]s.
pub trait WatchSource: Send + Sync {
    fn watch(&self, kind: ResourceKind) -> mpsc::Receiver<WatchEvent>;
}

/// A [`WatchSource`] that replays a fixed [`ResourceList`] as the initial
/// list and then closes.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    resources: ResourceList,
}

impl StaticFeed {
    pub fn new(resources: ResourceList) -> Self {
        Self { resources }
    }
}

impl WatchSource for StaticFeed {
    fn watch(&self, kind: ResourceKind) -> mpsc::Receiver<WatchEvent> {
        let items = self.resources.of_kind(kind);
        // Room for every item plus the sync marker, so sends never block.
        let (tx, rx) = mpsc::channel(items.len() + 1);
        for item in items {
            let _ = tx.try_send(WatchEvent::Applied(item));
        }
        let _ = tx.try_send(WatchEvent::InitialListDone(kind));
        rx
    }
}

/// Applies watch events to the cache.
#[derive(Clone)]
pub struct CacheFeeder {
    cache: ResourceCache,
}

impl CacheFeeder {
    pub fn new(cache: ResourceCache) -> Self {
        Self { cache }
    }

    /// Apply a single event.
    pub fn apply(&self, event: WatchEvent) -> StateResult<()> {
        match event {
            WatchEvent::Applied(resource) => self.cache.apply(resource),
            WatchEvent::Deleted { kind, key } => {
                self.cache.remove_kind(kind, &key)?;
                Ok(())
            }
            WatchEvent::InitialListDone(kind) => {
                self.cache.mark_synced(kind);
                Ok(())
            }
        }
    }

    /// Drain `events` into the cache until the channel closes or
    /// `shutdown` flips to `true`.
    ///
    /// Returns the number of events applied. Stops on the first cache
    /// error, since a poisoned cache cannot accept further updates.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StateResult<u64> {
        let stop = async {
            // A dropped sender means nobody can ask us to stop.
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(stop);

        let mut applied = 0u64;
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!(applied, "watch channel closed");
                        break;
                    };
                    if let Err(e) = self.apply(event) {
                        error!(error = %e, "failed to apply watch event");
                        return Err(e);
                    }
                    applied += 1;
                }
                _ = &mut stop => {
                    info!(applied, "cache feeder shutting down");
                    break;
                }
            }
        }
        Ok(applied)
    }

    /// Subscribe to every kind in `kinds` and spawn one feeder task per
    /// subscription.
    pub fn spawn_all(
        &self,
        source: &dyn WatchSource,
        kinds: &[ResourceKind],
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<StateResult<u64>>> {
        kinds
            .iter()
            .map(|&kind| {
                let events = source.watch(kind);
                let feeder = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let res = feeder.run(events, shutdown).await;
                    debug!(%kind, ok = res.is_ok(), "watch feeder finished");
                    res
                })
            })
            .collect()
    }
}
