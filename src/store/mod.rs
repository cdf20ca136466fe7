//! Replica storage - one collection per entity kind plus the sync state.
//!
//! Writes land in an uncommitted overlay that the writer can read back.
//! [`EntityStore::commit`] makes them durable; [`EntityStore::discard_uncommitted`]
//! drops them, which is exactly what a crash between checkpoints does.
//!
//! ## Example
//!
//! ```ignore
//! use catalog_replica::{EntityStore, InMemoryEntityStore, ItemEntity};
//!
//! let store = InMemoryEntityStore::new();
//! store.put_entity(&item)?;
//! store.commit()?;
//! let loaded = store.get_entity::<ItemEntity>("ITEM-1")?;
//! ```

mod file;
mod in_memory;
mod writer;

use crate::entity::CatalogEntity;
use crate::error::StoreError;
use crate::record::ObjectType;
use crate::sync::SyncState;

pub use file::FileEntityStore;
pub use in_memory::InMemoryEntityStore;
pub use writer::{WriterGate, WriterGuard};

/// Abstract storage for replica entities.
pub trait EntityStore: Send + Sync {
    /// Get an entity by id, including soft-deleted ones.
    fn get_entity<E: CatalogEntity>(&self, id: &str) -> Result<Option<E>, StoreError>;

    /// Insert or replace an entity. Version gating is the caller's job.
    fn put_entity<E: CatalogEntity>(&self, entity: &E) -> Result<(), StoreError>;

    /// All entities of one kind matching a predicate, ordered by id.
    fn find_entities<E: CatalogEntity>(
        &self,
        predicate: &dyn Fn(&E) -> bool,
    ) -> Result<Vec<E>, StoreError>;

    /// Stored version of `(kind, id)` without decoding the entity.
    fn entity_version(&self, kind: ObjectType, id: &str) -> Result<Option<i64>, StoreError>;

    /// Whether `(kind, id)` is stored and not soft-deleted.
    fn is_active(&self, kind: ObjectType, id: &str) -> Result<bool, StoreError>;

    /// Number of non-deleted entities of one kind.
    fn count_active(&self, kind: ObjectType) -> Result<usize, StoreError>;

    fn load_sync_state(&self) -> Result<Option<SyncState>, StoreError>;

    /// Durable immediately, independent of `commit`.
    fn save_sync_state(&self, state: &SyncState) -> Result<(), StoreError>;

    /// Make every uncommitted write durable. Returns how many were committed.
    fn commit(&self) -> Result<usize, StoreError>;

    /// Drop every uncommitted write. Returns how many were dropped.
    fn discard_uncommitted(&self) -> Result<usize, StoreError>;

    fn uncommitted_len(&self) -> Result<usize, StoreError>;

    /// The gate all mutations of this store serialize on.
    fn writer_gate(&self) -> &WriterGate;
}
