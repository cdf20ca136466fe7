//! InMemoryEntityStore - map-backed replica store for tests and ephemeral use.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use super::{EntityStore, WriterGate};
use crate::entity::{CatalogEntity, EntityMeta};
use crate::error::StoreError;
use crate::record::{unknown_key, ObjectType};
use crate::sync::SyncState;

/// Internal stored representation of an entity.
#[derive(Clone)]
pub(crate) struct StoredEntity {
    pub(crate) bytes: Vec<u8>,
    pub(crate) version: i64,
    pub(crate) deleted: bool,
}

impl StoredEntity {
    fn encode<E: CatalogEntity>(entity: &E) -> Result<Self, StoreError> {
        Ok(StoredEntity {
            bytes: serde_json::to_vec(entity)?,
            version: entity.version(),
            deleted: entity.is_deleted(),
        })
    }

    /// Rebuild from a serialized row of `kind`, reading only its header.
    pub(crate) fn from_row(
        kind: ObjectType,
        bytes: Vec<u8>,
    ) -> Result<(String, Self), StoreError> {
        #[derive(Deserialize)]
        struct Header {
            meta: EntityMeta,
            #[serde(default)]
            type_name: Option<String>,
        }
        let header: Header = serde_json::from_slice(&bytes)?;
        let stored = StoredEntity {
            bytes,
            version: header.meta.version,
            deleted: header.meta.deleted,
        };
        let key = match (kind, header.type_name) {
            (ObjectType::Unknown, Some(type_name)) => unknown_key(&type_name, &header.meta.id),
            _ => header.meta.id,
        };
        Ok((key, stored))
    }
}

type Collection = BTreeMap<String, StoredEntity>;

#[derive(Default)]
struct Inner {
    committed: HashMap<ObjectType, Collection>,
    pending: HashMap<ObjectType, Collection>,
    sync_state: Option<SyncState>,
}

impl Inner {
    fn lookup(&self, kind: ObjectType, id: &str) -> Option<&StoredEntity> {
        self.pending
            .get(&kind)
            .and_then(|c| c.get(id))
            .or_else(|| self.committed.get(&kind).and_then(|c| c.get(id)))
    }

    /// Committed rows overlaid with pending ones, ordered by id.
    fn merged(&self, kind: ObjectType) -> BTreeMap<&str, &StoredEntity> {
        let mut rows: BTreeMap<&str, &StoredEntity> = BTreeMap::new();
        for source in [self.committed.get(&kind), self.pending.get(&kind)]
            .into_iter()
            .flatten()
        {
            for (id, stored) in source {
                rows.insert(id.as_str(), stored);
            }
        }
        rows
    }

    fn pending_len(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }
}

/// In-memory replica store.
///
/// Clone-friendly: clones share the same storage and writer gate.
#[derive(Clone)]
pub struct InMemoryEntityStore {
    inner: Arc<RwLock<Inner>>,
    gate: Arc<WriterGate>,
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            gate: Arc::new(WriterGate::new()),
        }
    }

    /// Seed committed rows, bypassing the overlay. Used when loading from disk.
    pub(crate) fn load_committed(
        &self,
        kind: ObjectType,
        rows: Vec<(String, StoredEntity)>,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("load committed"))?;
        inner.committed.entry(kind).or_default().extend(rows);
        Ok(())
    }

    /// Commit, handing the merged rows of every touched kind to `persist`
    /// first. Nothing is promoted if `persist` fails.
    pub(crate) fn commit_with<F>(&self, persist: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&[(ObjectType, Vec<&[u8]>)]) -> Result<(), StoreError>,
    {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("commit"))?;

        let count = inner.pending_len();
        if count == 0 {
            return Ok(0);
        }

        {
            let mut touched: Vec<ObjectType> = inner.pending.keys().copied().collect();
            touched.sort();
            let snapshot: Vec<(ObjectType, Vec<&[u8]>)> = touched
                .into_iter()
                .map(|kind| {
                    let rows = inner
                        .merged(kind)
                        .into_values()
                        .map(|stored| stored.bytes.as_slice())
                        .collect();
                    (kind, rows)
                })
                .collect();
            persist(&snapshot)?;
        }

        let pending = std::mem::take(&mut inner.pending);
        for (kind, rows) in pending {
            inner.committed.entry(kind).or_default().extend(rows);
        }
        Ok(count)
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get_entity<E: CatalogEntity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        match inner.lookup(E::KIND, id) {
            Some(stored) => Ok(Some(serde_json::from_slice(&stored.bytes)?)),
            None => Ok(None),
        }
    }

    fn put_entity<E: CatalogEntity>(&self, entity: &E) -> Result<(), StoreError> {
        let stored = StoredEntity::encode(entity)?;
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        inner
            .pending
            .entry(E::KIND)
            .or_default()
            .insert(entity.storage_key().into_owned(), stored);
        Ok(())
    }

    fn find_entities<E: CatalogEntity>(
        &self,
        predicate: &dyn Fn(&E) -> bool,
    ) -> Result<Vec<E>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        let mut results = Vec::new();
        for stored in inner.merged(E::KIND).into_values() {
            let entity: E = serde_json::from_slice(&stored.bytes)?;
            if predicate(&entity) {
                results.push(entity);
            }
        }
        Ok(results)
    }

    fn entity_version(&self, kind: ObjectType, id: &str) -> Result<Option<i64>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.lookup(kind, id).map(|s| s.version))
    }

    fn is_active(&self, kind: ObjectType, id: &str) -> Result<bool, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.lookup(kind, id).is_some_and(|s| !s.deleted))
    }

    fn count_active(&self, kind: ObjectType) -> Result<usize, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner
            .merged(kind)
            .values()
            .filter(|stored| !stored.deleted)
            .count())
    }

    fn load_sync_state(&self) -> Result<Option<SyncState>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("sync state read"))?;
        Ok(inner.sync_state.clone())
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("sync state write"))?;
        inner.sync_state = Some(state.clone());
        Ok(())
    }

    fn commit(&self) -> Result<usize, StoreError> {
        self.commit_with(|_| Ok(()))
    }

    fn discard_uncommitted(&self) -> Result<usize, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("discard"))?;
        let dropped = inner.pending_len();
        inner.pending.clear();
        Ok(dropped)
    }

    fn uncommitted_len(&self) -> Result<usize, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.pending_len())
    }

    fn writer_gate(&self) -> &WriterGate {
        &self.gate
    }
}
