//! Typed, stored representations of catalog records.
//!
//! Every kind has its own collection. An entity promotes the payload fields
//! that queries need to first-class fields and keeps the original document in
//! `payload` so the remote object can be reconstructed losslessly.

mod types;

use std::borrow::Cow;
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::record::ObjectType;

pub use types::{
    CategoryEntity, DiscountEntity, ImageEntity, ItemEntity, ModifierEntity, ModifierListEntity,
    TaxEntity, UnknownEntity, VariationEntity,
};

/// Bookkeeping shared by every stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: String,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: SystemTime,
}

impl EntityMeta {
    pub fn new(id: impl Into<String>, version: i64, deleted: bool) -> Self {
        Self {
            id: id.into(),
            version,
            deleted,
            updated_at: SystemTime::now(),
        }
    }
}

/// Trait for types the replica store can hold.
pub trait CatalogEntity: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Kind of record this entity stores; also selects its collection.
    const KIND: ObjectType;

    /// Typed payload used to build and overwrite the entity.
    type Data;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Build a fresh entity from a record's typed data.
    fn create(meta: EntityMeta, data: Self::Data, payload: serde_json::Value) -> Self;

    /// Overwrite payload-owned fields. Derived and materialized fields survive.
    fn overwrite(&mut self, data: Self::Data, payload: serde_json::Value);

    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Key inside the kind's collection. Matches `CatalogRecord::storage_key`.
    fn storage_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.id())
    }

    fn version(&self) -> i64 {
        self.meta().version
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

/// Untyped result of a point lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyEntity {
    Item(ItemEntity),
    Variation(VariationEntity),
    Category(CategoryEntity),
    Tax(TaxEntity),
    Modifier(ModifierEntity),
    ModifierList(ModifierListEntity),
    Image(ImageEntity),
    Discount(DiscountEntity),
    Unknown(UnknownEntity),
}

impl AnyEntity {
    pub fn meta(&self) -> &EntityMeta {
        match self {
            AnyEntity::Item(e) => e.meta(),
            AnyEntity::Variation(e) => e.meta(),
            AnyEntity::Category(e) => e.meta(),
            AnyEntity::Tax(e) => e.meta(),
            AnyEntity::Modifier(e) => e.meta(),
            AnyEntity::ModifierList(e) => e.meta(),
            AnyEntity::Image(e) => e.meta(),
            AnyEntity::Discount(e) => e.meta(),
            AnyEntity::Unknown(e) => e.meta(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            AnyEntity::Item(_) => ObjectType::Item,
            AnyEntity::Variation(_) => ObjectType::Variation,
            AnyEntity::Category(_) => ObjectType::Category,
            AnyEntity::Tax(_) => ObjectType::Tax,
            AnyEntity::Modifier(_) => ObjectType::Modifier,
            AnyEntity::ModifierList(_) => ObjectType::ModifierList,
            AnyEntity::Image(_) => ObjectType::Image,
            AnyEntity::Discount(_) => ObjectType::Discount,
            AnyEntity::Unknown(_) => ObjectType::Unknown,
        }
    }

    /// The original data document as received.
    pub fn payload(&self) -> &serde_json::Value {
        match self {
            AnyEntity::Item(e) => &e.payload,
            AnyEntity::Variation(e) => &e.payload,
            AnyEntity::Category(e) => &e.payload,
            AnyEntity::Tax(e) => &e.payload,
            AnyEntity::Modifier(e) => &e.payload,
            AnyEntity::ModifierList(e) => &e.payload,
            AnyEntity::Image(e) => &e.payload,
            AnyEntity::Discount(e) => &e.payload,
            AnyEntity::Unknown(e) => &e.payload,
        }
    }
}
