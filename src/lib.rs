//! Local replica of a remote, versioned catalog.
//!
//! Records arrive out of order, in batches of any size, possibly replayed.
//! The [`UpsertEngine`] applies each one only if it is newer than what is
//! stored, the [`BatchProcessor`] commits in checkpoints, the
//! [`RelationshipLinker`] materializes item images once a batch has landed,
//! and the [`SyncCoordinator`] persists enough state to resume after a crash.

mod batch;
mod config;
mod entity;
mod error;
mod link;
mod query;
mod record;
mod resolve;
mod stats;
mod store;
mod sync;
mod upsert;

pub use batch::{
    BatchOptions, BatchProcessor, BatchResult, CancellationToken, Checkpoint,
    DEFAULT_CHECKPOINT_INTERVAL,
};
pub use config::ReplicaConfig;
pub use entity::{
    AnyEntity, CatalogEntity, CategoryEntity, DiscountEntity, EntityMeta, ImageEntity,
    ItemEntity, ModifierEntity, ModifierListEntity, TaxEntity, UnknownEntity, VariationEntity,
};
pub use error::{PayloadError, ReplicaError, Result, SourceError, StoreError};
pub use link::{LinkReport, RelationshipLinker, RelinkPolicy};
pub use query::CatalogQueries;
pub use record::{
    unknown_key, wire, CatalogRecord, CategoryData, DiscountData, ImageData, ItemData,
    ModifierData, ModifierListData, Money, ObjectType, RecordPayload, TaxData, VariationData,
};
pub use resolve::{DerivedNames, ItemView, Resolver};
pub use stats::{StatsAggregator, StatsSnapshot};
pub use store::{EntityStore, FileEntityStore, InMemoryEntityStore, WriterGate, WriterGuard};
#[cfg(feature = "emitter")]
pub use sync::events::{SyncEvents, STATS_EVENT, SYNC_STATE_EVENT};
pub use sync::{
    CatalogSource, CatalogSync, PageRequest, SourcePage, SyncCoordinator, SyncReport, SyncState,
    SyncStatus, SyncType, SyncWorkerThread,
};
pub use upsert::{SkipReason, UpsertEngine, UpsertOutcome};
