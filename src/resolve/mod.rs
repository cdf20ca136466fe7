//! Denormalization of display names onto items.
//!
//! Items cache the names of their category, reporting category, taxes and
//! modifier lists. Resolution is best effort: a reference whose entity is
//! absent or soft-deleted simply yields no name. [`Resolver::view`] computes
//! the same names on read, and [`Resolver::repair_all`] refreshes the cached
//! copy once a batch has landed.

use tracing::{debug, info};

use crate::entity::{CatalogEntity, CategoryEntity, ItemEntity, ModifierListEntity, TaxEntity};
use crate::error::StoreError;
use crate::store::{EntityStore, WriterGuard};

/// Names derived from an item's references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedNames {
    pub category_name: Option<String>,
    pub reporting_category_name: Option<String>,
    pub tax_names: Vec<String>,
    pub modifier_names: Vec<String>,
}

impl DerivedNames {
    fn cached(item: &ItemEntity) -> Self {
        Self {
            category_name: item.category_name.clone(),
            reporting_category_name: item.reporting_category_name.clone(),
            tax_names: item.tax_names.clone(),
            modifier_names: item.modifier_names.clone(),
        }
    }

    fn write_to(self, item: &mut ItemEntity) {
        item.category_name = self.category_name;
        item.reporting_category_name = self.reporting_category_name;
        item.tax_names = self.tax_names;
        item.modifier_names = self.modifier_names;
    }
}

/// An item with names computed from the live store at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub item: ItemEntity,
    pub names: DerivedNames,
}

pub struct Resolver<'a, S> {
    store: &'a S,
}

impl<'a, S: EntityStore> Resolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Compute names for `item` from whatever is currently stored.
    pub fn names_for(&self, item: &ItemEntity) -> Result<DerivedNames, StoreError> {
        let category_name = match &item.category_id {
            Some(id) => self.active::<CategoryEntity>(id)?.map(|c| c.name),
            None => None,
        };
        let reporting_category_name = match &item.reporting_category_id {
            Some(id) => self.active::<CategoryEntity>(id)?.map(|c| c.name),
            None => None,
        };

        let mut tax_names = Vec::with_capacity(item.tax_ids.len());
        for id in &item.tax_ids {
            match self.active::<TaxEntity>(id)? {
                Some(tax) => tax_names.push(tax.name),
                None => debug!(item_id = %item.id(), tax_id = %id, "tax not yet available"),
            }
        }

        let mut modifier_names = Vec::with_capacity(item.modifier_list_ids.len());
        for id in &item.modifier_list_ids {
            match self.active::<ModifierListEntity>(id)? {
                Some(list) => modifier_names.push(list.name),
                None => debug!(
                    item_id = %item.id(),
                    modifier_list_id = %id,
                    "modifier list not yet available"
                ),
            }
        }

        Ok(DerivedNames {
            category_name,
            reporting_category_name,
            tax_names,
            modifier_names,
        })
    }

    /// Refresh the cached names on `item` in place.
    pub fn resolve_item(&self, item: &mut ItemEntity) -> Result<(), StoreError> {
        self.names_for(item)?.write_to(item);
        Ok(())
    }

    /// Load an item and attach freshly computed names.
    pub fn view(&self, item_id: &str) -> Result<Option<ItemView>, StoreError> {
        let Some(item) = self.store.get_entity::<ItemEntity>(item_id)? else {
            return Ok(None);
        };
        let names = self.names_for(&item)?;
        Ok(Some(ItemView { item, names }))
    }

    /// Recompute every live item's cached names and rewrite the ones that
    /// changed. Returns how many items were rewritten.
    pub fn repair_all(&self, _guard: &WriterGuard<'_>) -> Result<usize, StoreError> {
        let items = self.store.find_entities::<ItemEntity>(&|item| !item.is_deleted())?;
        let mut repaired = 0;
        for mut item in items {
            let names = self.names_for(&item)?;
            if names == DerivedNames::cached(&item) {
                continue;
            }
            names.write_to(&mut item);
            self.store.put_entity(&item)?;
            repaired += 1;
        }
        if repaired > 0 {
            info!(repaired, "repaired denormalized item names");
        }
        Ok(repaired)
    }

    fn active<E: CatalogEntity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        Ok(self
            .store
            .get_entity::<E>(id)?
            .filter(|entity| !entity.is_deleted()))
    }
}
