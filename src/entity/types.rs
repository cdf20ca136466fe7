use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{CatalogEntity, EntityMeta};
use crate::record::{
    unknown_key, CategoryData, DiscountData, ImageData, ItemData, ModifierData, ModifierListData,
    Money, ObjectType, TaxData, VariationData,
};

macro_rules! meta_accessors {
    () => {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub description: Option<String>,
    pub abbreviation: Option<String>,
    pub product_type: Option<String>,
    pub category_id: Option<String>,
    pub reporting_category_id: Option<String>,
    pub tax_ids: Vec<String>,
    pub modifier_list_ids: Vec<String>,
    /// Derived from the stored Category; absent until it has been ingested.
    pub category_name: Option<String>,
    pub reporting_category_name: Option<String>,
    pub tax_names: Vec<String>,
    pub modifier_names: Vec<String>,
    /// Image ids linked by the relationship linker. Always a subset of the
    /// images present in the store.
    pub image_refs: Vec<String>,
    pub payload: serde_json::Value,
}

impl ItemEntity {
    /// Image ids declared by the payload, in payload order.
    pub fn declared_image_ids(&self) -> Vec<String> {
        self.payload
            .get("image_ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CatalogEntity for ItemEntity {
    const KIND: ObjectType = ObjectType::Item;
    type Data = ItemData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: ItemData, payload: serde_json::Value) -> Self {
        let mut item = ItemEntity {
            meta,
            name: String::new(),
            description: None,
            abbreviation: None,
            product_type: None,
            category_id: None,
            reporting_category_id: None,
            tax_ids: Vec::new(),
            modifier_list_ids: Vec::new(),
            category_name: None,
            reporting_category_name: None,
            tax_names: Vec::new(),
            modifier_names: Vec::new(),
            image_refs: Vec::new(),
            payload: serde_json::Value::Null,
        };
        item.overwrite(data, payload);
        item
    }

    fn overwrite(&mut self, data: ItemData, payload: serde_json::Value) {
        self.category_id = data.primary_category_id().map(str::to_string);
        self.reporting_category_id = data.reporting_category_id().map(str::to_string);
        self.modifier_list_ids = data.modifier_list_ids();
        self.name = data.name;
        self.description = data.description;
        self.abbreviation = data.abbreviation;
        self.product_type = data.product_type;
        self.tax_ids = data.tax_ids;
        self.payload = payload;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationEntity {
    pub meta: EntityMeta,
    pub item_id: String,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub ordinal: Option<i64>,
    pub pricing_type: Option<String>,
    pub price: Option<Money>,
    pub payload: serde_json::Value,
}

impl CatalogEntity for VariationEntity {
    const KIND: ObjectType = ObjectType::Variation;
    type Data = VariationData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: VariationData, payload: serde_json::Value) -> Self {
        VariationEntity {
            meta,
            item_id: data.item_id,
            name: data.name,
            sku: data.sku,
            upc: data.upc,
            ordinal: data.ordinal,
            pricing_type: data.pricing_type,
            price: data.price_money,
            payload,
        }
    }

    fn overwrite(&mut self, data: VariationData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub parent_category_id: Option<String>,
    pub payload: serde_json::Value,
}

impl CatalogEntity for CategoryEntity {
    const KIND: ObjectType = ObjectType::Category;
    type Data = CategoryData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: CategoryData, payload: serde_json::Value) -> Self {
        CategoryEntity {
            meta,
            name: data.name,
            parent_category_id: data.parent_category.map(|c| c.id),
            payload,
        }
    }

    fn overwrite(&mut self, data: CategoryData, payload: serde_json::Value) {
        self.name = data.name;
        self.parent_category_id = data.parent_category.map(|c| c.id);
        self.payload = payload;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub percentage: Option<String>,
    pub calculation_phase: Option<String>,
    pub inclusion_type: Option<String>,
    pub enabled: bool,
    pub payload: serde_json::Value,
}

impl CatalogEntity for TaxEntity {
    const KIND: ObjectType = ObjectType::Tax;
    type Data = TaxData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: TaxData, payload: serde_json::Value) -> Self {
        TaxEntity {
            meta,
            name: data.name,
            percentage: data.percentage,
            calculation_phase: data.calculation_phase,
            inclusion_type: data.inclusion_type,
            enabled: data.enabled.unwrap_or(true),
            payload,
        }
    }

    fn overwrite(&mut self, data: TaxData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub modifier_list_id: Option<String>,
    pub price: Option<Money>,
    pub ordinal: Option<i64>,
    pub payload: serde_json::Value,
}

impl CatalogEntity for ModifierEntity {
    const KIND: ObjectType = ObjectType::Modifier;
    type Data = ModifierData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: ModifierData, payload: serde_json::Value) -> Self {
        ModifierEntity {
            meta,
            name: data.name,
            modifier_list_id: data.modifier_list_id,
            price: data.price_money,
            ordinal: data.ordinal,
            payload,
        }
    }

    fn overwrite(&mut self, data: ModifierData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierListEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub selection_type: Option<String>,
    pub ordinal: Option<i64>,
    pub payload: serde_json::Value,
}

impl CatalogEntity for ModifierListEntity {
    const KIND: ObjectType = ObjectType::ModifierList;
    type Data = ModifierListData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: ModifierListData, payload: serde_json::Value) -> Self {
        ModifierListEntity {
            meta,
            name: data.name,
            selection_type: data.selection_type,
            ordinal: data.ordinal,
            payload,
        }
    }

    fn overwrite(&mut self, data: ModifierListData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntity {
    pub meta: EntityMeta,
    pub url: String,
    pub name: Option<String>,
    pub caption: Option<String>,
    pub payload: serde_json::Value,
}

impl CatalogEntity for ImageEntity {
    const KIND: ObjectType = ObjectType::Image;
    type Data = ImageData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: ImageData, payload: serde_json::Value) -> Self {
        ImageEntity {
            meta,
            url: data.url,
            name: data.name,
            caption: data.caption,
            payload,
        }
    }

    fn overwrite(&mut self, data: ImageData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub discount_type: Option<String>,
    pub percentage: Option<String>,
    pub amount: Option<Money>,
    pub pin_required: bool,
    pub payload: serde_json::Value,
}

impl CatalogEntity for DiscountEntity {
    const KIND: ObjectType = ObjectType::Discount;
    type Data = DiscountData;

    meta_accessors!();

    fn create(meta: EntityMeta, data: DiscountData, payload: serde_json::Value) -> Self {
        DiscountEntity {
            meta,
            name: data.name,
            discount_type: data.discount_type,
            percentage: data.percentage,
            amount: data.amount_money,
            pin_required: data.pin_required.unwrap_or(false),
            payload,
        }
    }

    fn overwrite(&mut self, data: DiscountData, payload: serde_json::Value) {
        let meta = self.meta.clone();
        *self = Self::create(meta, data, payload);
    }
}

/// An object of a kind this build does not model, stored opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownEntity {
    pub meta: EntityMeta,
    pub type_name: String,
    pub payload: serde_json::Value,
}

impl CatalogEntity for UnknownEntity {
    const KIND: ObjectType = ObjectType::Unknown;
    /// The remote type name.
    type Data = String;

    meta_accessors!();

    fn create(meta: EntityMeta, type_name: String, payload: serde_json::Value) -> Self {
        UnknownEntity {
            meta,
            type_name,
            payload,
        }
    }

    fn overwrite(&mut self, type_name: String, payload: serde_json::Value) {
        self.type_name = type_name;
        self.payload = payload;
    }

    fn storage_key(&self) -> Cow<'_, str> {
        Cow::Owned(unknown_key(&self.type_name, self.id()))
    }
}
