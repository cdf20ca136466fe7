//! Cached per-kind counts of live entities.

use std::collections::BTreeMap;
#[cfg(feature = "emitter")]
use std::sync::Arc;
use std::sync::RwLock;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::record::ObjectType;
use crate::store::EntityStore;

#[cfg(feature = "emitter")]
use crate::sync::events::{SyncEvents, STATS_EVENT};

/// Non-deleted entity counts for every known kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub counts: BTreeMap<ObjectType, usize>,
    pub total: usize,
    pub last_updated: Option<SystemTime>,
}

impl StatsSnapshot {
    pub fn zero() -> Self {
        Self {
            counts: ObjectType::KNOWN.into_iter().map(|kind| (kind, 0)).collect(),
            total: 0,
            last_updated: None,
        }
    }

    pub fn count(&self, kind: ObjectType) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(Default)]
struct Cache {
    snapshot: StatsSnapshot,
    loaded: bool,
    /// Set by `reset_to_zero`; only a forced refresh replaces the zeros.
    zeroed: bool,
}

/// Read-side aggregator. Never writes to the store and never takes the
/// writer gate.
pub struct StatsAggregator<S> {
    store: S,
    cache: RwLock<Cache>,
    #[cfg(feature = "emitter")]
    events: Option<Arc<SyncEvents>>,
}

impl<S: EntityStore> StatsAggregator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(Cache::default()),
            #[cfg(feature = "emitter")]
            events: None,
        }
    }

    #[cfg(feature = "emitter")]
    pub fn with_events(store: S, events: Arc<SyncEvents>) -> Self {
        Self {
            events: Some(events),
            ..Self::new(store)
        }
    }

    /// Cached counts, recomputed when `force` is set or nothing is cached.
    /// After `reset_to_zero` an unforced refresh keeps returning the zeros.
    pub fn refresh(&self, force: bool) -> Result<StatsSnapshot, StoreError> {
        if !force {
            let cache = self
                .cache
                .read()
                .map_err(|_| StoreError::LockPoisoned("stats read"))?;
            if cache.loaded || cache.zeroed {
                return Ok(cache.snapshot.clone());
            }
        }

        let mut counts = BTreeMap::new();
        for kind in ObjectType::KNOWN {
            counts.insert(kind, self.store.count_active(kind)?);
        }
        let snapshot = StatsSnapshot {
            total: counts.values().sum(),
            counts,
            last_updated: Some(SystemTime::now()),
        };
        debug!(total = snapshot.total, force, "stats refreshed");

        self.store_snapshot(snapshot.clone(), true)?;
        Ok(snapshot)
    }

    pub fn force_refresh(&self) -> Result<StatsSnapshot, StoreError> {
        self.refresh(true)
    }

    /// Show zeros while a sync rebuilds the data, until `force_refresh`.
    pub fn reset_to_zero(&self) -> Result<(), StoreError> {
        let snapshot = StatsSnapshot {
            last_updated: Some(SystemTime::now()),
            ..StatsSnapshot::zero()
        };
        self.store_snapshot(snapshot, false)
    }

    pub fn has_loaded_stats(&self) -> bool {
        self.cache.read().map(|cache| cache.loaded).unwrap_or(false)
    }

    /// Last cached snapshot without touching the store.
    pub fn snapshot(&self) -> Result<StatsSnapshot, StoreError> {
        let cache = self
            .cache
            .read()
            .map_err(|_| StoreError::LockPoisoned("stats read"))?;
        Ok(cache.snapshot.clone())
    }

    fn store_snapshot(&self, snapshot: StatsSnapshot, loaded: bool) -> Result<(), StoreError> {
        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| StoreError::LockPoisoned("stats write"))?;
            cache.snapshot = snapshot.clone();
            cache.loaded = loaded;
            cache.zeroed = !loaded;
        }
        self.publish(&snapshot);
        Ok(())
    }

    #[cfg(feature = "emitter")]
    fn publish(&self, snapshot: &StatsSnapshot) {
        if let Some(events) = &self.events {
            events.publish(STATS_EVENT, snapshot);
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn publish(&self, _snapshot: &StatsSnapshot) {}
}
