//! Read-only lookups for the presentation layer.

use crate::entity::{
    AnyEntity, CatalogEntity, CategoryEntity, DiscountEntity, ImageEntity, ItemEntity,
    ModifierEntity, ModifierListEntity, TaxEntity, UnknownEntity, VariationEntity,
};
use crate::error::StoreError;
use crate::record::ObjectType;
use crate::resolve::{ItemView, Resolver};
use crate::store::EntityStore;

pub struct CatalogQueries<'a, S> {
    store: &'a S,
}

impl<'a, S: EntityStore> CatalogQueries<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Point lookup by kind and id. Soft-deleted entities are returned too.
    /// Unmodelled kinds are looked up by their `unknown_key`.
    pub fn fetch_by_id(&self, kind: ObjectType, id: &str) -> Result<Option<AnyEntity>, StoreError> {
        let entity = match kind {
            ObjectType::Item => self.store.get_entity::<ItemEntity>(id)?.map(AnyEntity::Item),
            ObjectType::Variation => self
                .store
                .get_entity::<VariationEntity>(id)?
                .map(AnyEntity::Variation),
            ObjectType::Category => self
                .store
                .get_entity::<CategoryEntity>(id)?
                .map(AnyEntity::Category),
            ObjectType::Tax => self.store.get_entity::<TaxEntity>(id)?.map(AnyEntity::Tax),
            ObjectType::Modifier => self
                .store
                .get_entity::<ModifierEntity>(id)?
                .map(AnyEntity::Modifier),
            ObjectType::ModifierList => self
                .store
                .get_entity::<ModifierListEntity>(id)?
                .map(AnyEntity::ModifierList),
            ObjectType::Image => self.store.get_entity::<ImageEntity>(id)?.map(AnyEntity::Image),
            ObjectType::Discount => self
                .store
                .get_entity::<DiscountEntity>(id)?
                .map(AnyEntity::Discount),
            ObjectType::Unknown => self
                .store
                .get_entity::<UnknownEntity>(id)?
                .map(AnyEntity::Unknown),
        };
        Ok(entity)
    }

    /// Stored version, `None` when the key was never seen.
    pub fn fetch_version(&self, kind: ObjectType, id: &str) -> Result<Option<i64>, StoreError> {
        self.store.entity_version(kind, id)
    }

    /// Live variations of an item, by ordinal then id.
    pub fn variations_for_item(&self, item_id: &str) -> Result<Vec<VariationEntity>, StoreError> {
        let mut variations = self
            .store
            .find_entities::<VariationEntity>(&|v| !v.is_deleted() && v.item_id == item_id)?;
        variations.sort_by(|a, b| {
            a.ordinal
                .unwrap_or(i64::MAX)
                .cmp(&b.ordinal.unwrap_or(i64::MAX))
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(variations)
    }

    /// First live variation whose SKU or UPC equals `code`.
    pub fn find_variation_by_code(
        &self,
        code: &str,
    ) -> Result<Option<VariationEntity>, StoreError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let matches = self.store.find_entities::<VariationEntity>(&|v| {
            !v.is_deleted()
                && (v.sku.as_deref() == Some(code) || v.upc.as_deref() == Some(code))
        })?;
        Ok(matches.into_iter().next())
    }

    /// Live items whose name contains `fragment`, ignoring case.
    pub fn search_items(&self, fragment: &str) -> Result<Vec<ItemEntity>, StoreError> {
        let needle = fragment.trim().to_lowercase();
        let mut items = self.store.find_entities::<ItemEntity>(&|item| {
            !item.is_deleted() && item.name.to_lowercase().contains(&needle)
        })?;
        items.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(items)
    }

    pub fn item_view(&self, item_id: &str) -> Result<Option<ItemView>, StoreError> {
        Resolver::new(self.store).view(item_id)
    }

    /// Linked images of an item in edge order, skipping any deleted since
    /// the last relink.
    pub fn images_for_item(&self, item_id: &str) -> Result<Vec<ImageEntity>, StoreError> {
        let Some(item) = self.store.get_entity::<ItemEntity>(item_id)? else {
            return Ok(Vec::new());
        };
        let mut images = Vec::with_capacity(item.image_refs.len());
        for id in &item.image_refs {
            if let Some(image) = self.store.get_entity::<ImageEntity>(id)? {
                if !image.is_deleted() {
                    images.push(image);
                }
            }
        }
        Ok(images)
    }
}
