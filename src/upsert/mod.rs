//! Version-gated, idempotent application of one incoming record.
//!
//! A record is applied only when its version is strictly greater than the
//! stored one, so replays and late deliveries never regress a key.

use std::time::SystemTime;

use tracing::{debug, trace, warn};

use crate::entity::{
    CatalogEntity, CategoryEntity, DiscountEntity, EntityMeta, ImageEntity, ItemEntity,
    ModifierEntity, ModifierListEntity, TaxEntity, UnknownEntity, VariationEntity,
};
use crate::error::{PayloadError, StoreError};
use crate::record::{CatalogRecord, RecordPayload};
use crate::resolve::Resolver;
use crate::store::{EntityStore, WriterGuard};

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped(SkipReason),
}

impl UpsertOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Updated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The stored version is the same or newer.
    StaleVersion { incoming: i64, current: i64 },
    /// The data document does not satisfy its declared kind.
    InvalidPayload(PayloadError),
}

/// Applies records to a store.
pub struct UpsertEngine<'a, S> {
    store: &'a S,
}

impl<'a, S: EntityStore> UpsertEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Apply one record under the store's writer gate.
    pub fn apply(&self, record: &CatalogRecord) -> Result<UpsertOutcome, StoreError> {
        let guard = self.store.writer_gate().acquire()?;
        self.apply_locked(&guard, record)
    }

    /// Apply one record; the caller already holds the writer gate.
    ///
    /// Only storage faults are returned as errors. Stale and malformed
    /// records come back as [`UpsertOutcome::Skipped`].
    pub fn apply_locked(
        &self,
        _guard: &WriterGuard<'_>,
        record: &CatalogRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        let key = record.storage_key();
        if let Some(current) = self.store.entity_version(record.object_type, &key)? {
            if !record.is_newer_than(current) {
                debug!(
                    object_type = %record.object_type,
                    id = %record.id,
                    incoming = record.version,
                    current,
                    "skipping stale record"
                );
                return Ok(UpsertOutcome::Skipped(SkipReason::StaleVersion {
                    incoming: record.version,
                    current,
                }));
            }
        }

        let payload = match record.payload() {
            Ok(payload) => payload,
            // Deletions routinely arrive without data.
            Err(_) if record.deleted => RecordPayload::placeholder(record.object_type),
            Err(err) => {
                warn!(
                    object_type = %record.object_type,
                    id = %record.id,
                    version = record.version,
                    error = %err,
                    "skipping record with invalid payload"
                );
                return Ok(UpsertOutcome::Skipped(SkipReason::InvalidPayload(err)));
            }
        };

        let outcome = match payload {
            RecordPayload::Item(data) => self.upsert::<ItemEntity>(record, data, |item| {
                if item.is_deleted() {
                    return Ok(());
                }
                Resolver::new(self.store).resolve_item(item)
            })?,
            RecordPayload::Variation(data) => {
                self.upsert::<VariationEntity>(record, data, no_post)?
            }
            RecordPayload::Category(data) => self.upsert::<CategoryEntity>(record, data, no_post)?,
            RecordPayload::Tax(data) => self.upsert::<TaxEntity>(record, data, no_post)?,
            RecordPayload::Modifier(data) => self.upsert::<ModifierEntity>(record, data, no_post)?,
            RecordPayload::ModifierList(data) => {
                self.upsert::<ModifierListEntity>(record, data, no_post)?
            }
            RecordPayload::Image(data) => self.upsert::<ImageEntity>(record, data, no_post)?,
            RecordPayload::Discount(data) => self.upsert::<DiscountEntity>(record, data, no_post)?,
            RecordPayload::Unknown { type_name, .. } => {
                self.upsert::<UnknownEntity>(record, type_name, no_post)?
            }
        };

        trace!(
            object_type = %record.object_type,
            id = %record.id,
            version = record.version,
            ?outcome,
            "applied record"
        );
        Ok(outcome)
    }

    fn upsert<E: CatalogEntity>(
        &self,
        record: &CatalogRecord,
        data: E::Data,
        post: impl FnOnce(&mut E) -> Result<(), StoreError>,
    ) -> Result<UpsertOutcome, StoreError> {
        let (mut entity, outcome) = match self.store.get_entity::<E>(&record.storage_key())? {
            Some(mut entity) => {
                let meta = entity.meta_mut();
                meta.version = record.version;
                meta.deleted = record.deleted;
                meta.updated_at = SystemTime::now();
                // A deletion keeps the last known display data.
                if !record.deleted {
                    entity.overwrite(data, record.data.clone());
                }
                (entity, UpsertOutcome::Updated)
            }
            None => {
                let meta = EntityMeta::new(record.id.clone(), record.version, record.deleted);
                (
                    E::create(meta, data, record.data.clone()),
                    UpsertOutcome::Inserted,
                )
            }
        };

        post(&mut entity)?;
        self.store.put_entity(&entity)?;
        Ok(outcome)
    }
}

fn no_post<E>(_: &mut E) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ObjectType;
    use crate::store::InMemoryEntityStore;
    use serde_json::json;
    use tracing_test::traced_test;

    fn item(id: &str, version: i64, name: &str) -> CatalogRecord {
        CatalogRecord::new(ObjectType::Item, id, version, json!({ "name": name }))
    }

    #[test]
    fn replay_is_skipped_and_state_unchanged() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        let record = item("A", 1, "Bagel");

        assert_eq!(engine.apply(&record).unwrap(), UpsertOutcome::Inserted);
        let first = store.get_entity::<ItemEntity>("A").unwrap().unwrap();

        assert_eq!(
            engine.apply(&record).unwrap(),
            UpsertOutcome::Skipped(SkipReason::StaleVersion {
                incoming: 1,
                current: 1
            })
        );
        let second = store.get_entity::<ItemEntity>("A").unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn older_version_never_regresses() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);

        engine.apply(&item("A", 5, "New name")).unwrap();
        let outcome = engine.apply(&item("A", 4, "Old name")).unwrap();

        assert!(matches!(
            outcome,
            UpsertOutcome::Skipped(SkipReason::StaleVersion { .. })
        ));
        let stored = store.get_entity::<ItemEntity>("A").unwrap().unwrap();
        assert_eq!(stored.name, "New name");
        assert_eq!(stored.version(), 5);
    }

    #[test]
    fn deletion_keeps_display_fields() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        engine.apply(&item("A", 1, "Croissant")).unwrap();

        let outcome = engine
            .apply(&CatalogRecord::tombstone(ObjectType::Item, "A", 2))
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        let stored = store.get_entity::<ItemEntity>("A").unwrap().unwrap();
        assert!(stored.is_deleted());
        assert_eq!(stored.version(), 2);
        assert_eq!(stored.name, "Croissant");
        assert_eq!(stored.payload, json!({ "name": "Croissant" }));
    }

    #[test]
    fn tombstone_for_unseen_key_blocks_older_upserts() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);

        assert_eq!(
            engine
                .apply(&CatalogRecord::tombstone(ObjectType::Category, "C1", 9))
                .unwrap(),
            UpsertOutcome::Inserted
        );
        let late = CatalogRecord::new(ObjectType::Category, "C1", 3, json!({"name": "Zombie"}));
        assert!(!engine.apply(&late).unwrap().is_applied());
        assert!(!store.is_active(ObjectType::Category, "C1").unwrap());
    }

    #[traced_test]
    #[test]
    fn invalid_payload_is_skipped_and_logged() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        let record = CatalogRecord::new(ObjectType::Variation, "V1", 1, json!({"sku": "123"}));

        let outcome = engine.apply(&record).unwrap();

        assert!(matches!(
            outcome,
            UpsertOutcome::Skipped(SkipReason::InvalidPayload(_))
        ));
        assert!(store.get_entity::<VariationEntity>("V1").unwrap().is_none());
        assert!(logs_contain("skipping record with invalid payload"));
    }

    #[test]
    fn item_names_resolve_from_stored_references() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        engine
            .apply(&CatalogRecord::new(
                ObjectType::Category,
                "C1",
                1,
                json!({"name": "Pastry"}),
            ))
            .unwrap();
        engine
            .apply(&CatalogRecord::new(
                ObjectType::Item,
                "A",
                1,
                json!({"name": "Danish", "category_id": "C1", "tax_ids": ["T-missing"]}),
            ))
            .unwrap();

        let stored = store.get_entity::<ItemEntity>("A").unwrap().unwrap();
        assert_eq!(stored.category_name.as_deref(), Some("Pastry"));
        assert!(stored.tax_names.is_empty());
    }

    #[test]
    fn unknown_kinds_are_stored_opaquely() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        let doc = json!({"type": "PRICING_RULE", "id": "P1", "version": 2});
        let record = CatalogRecord::new(ObjectType::Unknown, "P1", 2, doc.clone());

        assert_eq!(engine.apply(&record).unwrap(), UpsertOutcome::Inserted);
        let stored = store
            .get_entity::<UnknownEntity>("PRICING_RULE:P1")
            .unwrap()
            .unwrap();
        assert_eq!(stored.type_name, "PRICING_RULE");
        assert_eq!(stored.meta.id, "P1");
        assert_eq!(stored.payload, doc);
    }

    #[test]
    fn unknown_kinds_sharing_an_id_do_not_collide() {
        let store = InMemoryEntityStore::new();
        let engine = UpsertEngine::new(&store);
        let rule = CatalogRecord::new(
            ObjectType::Unknown,
            "P1",
            5,
            json!({"type": "PRICING_RULE", "id": "P1"}),
        );
        let set = CatalogRecord::new(
            ObjectType::Unknown,
            "P1",
            3,
            json!({"type": "PRODUCT_SET", "id": "P1"}),
        );

        assert_eq!(engine.apply(&rule).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(engine.apply(&set).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(
            store.entity_version(ObjectType::Unknown, "PRODUCT_SET:P1").unwrap(),
            Some(3)
        );
        assert_eq!(
            store.entity_version(ObjectType::Unknown, "PRICING_RULE:P1").unwrap(),
            Some(5)
        );
        assert_eq!(store.count_active(ObjectType::Unknown).unwrap(), 2);
    }
}
