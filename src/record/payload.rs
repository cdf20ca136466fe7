use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ObjectType;
use crate::error::PayloadError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierListInfo {
    pub modifier_list_id: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub abbreviation: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub categories: Vec<IdRef>,
    #[serde(default)]
    pub reporting_category: Option<IdRef>,
    #[serde(default)]
    pub tax_ids: Vec<String>,
    #[serde(default)]
    pub modifier_list_info: Vec<ModifierListInfo>,
    #[serde(default)]
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub product_type: Option<String>,
}

impl ItemData {
    /// The legacy `category_id` wins; otherwise the first entry of `categories`.
    pub fn primary_category_id(&self) -> Option<&str> {
        self.category_id
            .as_deref()
            .or_else(|| self.categories.first().map(|c| c.id.as_str()))
    }

    pub fn reporting_category_id(&self) -> Option<&str> {
        self.reporting_category.as_ref().map(|c| c.id.as_str())
    }

    pub fn modifier_list_ids(&self) -> Vec<String> {
        self.modifier_list_info
            .iter()
            .filter(|info| info.enabled.unwrap_or(true))
            .map(|info| info.modifier_list_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationData {
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub ordinal: Option<i64>,
    #[serde(default)]
    pub pricing_type: Option<String>,
    #[serde(default)]
    pub price_money: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryData {
    pub name: String,
    #[serde(default)]
    pub parent_category: Option<IdRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxData {
    pub name: String,
    #[serde(default)]
    pub percentage: Option<String>,
    #[serde(default)]
    pub calculation_phase: Option<String>,
    #[serde(default)]
    pub inclusion_type: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierData {
    pub name: String,
    #[serde(default)]
    pub modifier_list_id: Option<String>,
    #[serde(default)]
    pub price_money: Option<Money>,
    #[serde(default)]
    pub ordinal: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierListData {
    pub name: String,
    #[serde(default)]
    pub selection_type: Option<String>,
    #[serde(default)]
    pub ordinal: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountData {
    pub name: String,
    #[serde(default)]
    pub discount_type: Option<String>,
    #[serde(default)]
    pub percentage: Option<String>,
    #[serde(default)]
    pub amount_money: Option<Money>,
    #[serde(default)]
    pub pin_required: Option<bool>,
}

/// Typed view of a record's data document.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Item(ItemData),
    Variation(VariationData),
    Category(CategoryData),
    Tax(TaxData),
    Modifier(ModifierData),
    ModifierList(ModifierListData),
    Image(ImageData),
    Discount(DiscountData),
    /// Stored as-is and ignored by every type-specific step.
    Unknown {
        type_name: String,
        document: serde_json::Value,
    },
}

impl RecordPayload {
    pub fn decode(object_type: ObjectType, data: &serde_json::Value) -> Result<Self, PayloadError> {
        if object_type == ObjectType::Unknown {
            return Ok(unknown(data));
        }

        if !data.is_object() {
            return Err(PayloadError::MissingField(
                object_type.data_key().unwrap_or("data"),
            ));
        }

        let payload = match object_type {
            ObjectType::Item => RecordPayload::Item(parse(data)?),
            ObjectType::Variation => {
                let variation: VariationData = parse(data)?;
                if variation.item_id.is_empty() {
                    return Err(PayloadError::MissingField("item_id"));
                }
                RecordPayload::Variation(variation)
            }
            ObjectType::Category => RecordPayload::Category(parse(data)?),
            ObjectType::Tax => RecordPayload::Tax(parse(data)?),
            ObjectType::Modifier => RecordPayload::Modifier(parse(data)?),
            ObjectType::ModifierList => RecordPayload::ModifierList(parse(data)?),
            ObjectType::Image => {
                let image: ImageData = parse(data)?;
                if image.url.is_empty() {
                    return Err(PayloadError::MissingField("url"));
                }
                RecordPayload::Image(image)
            }
            ObjectType::Discount => RecordPayload::Discount(parse(data)?),
            ObjectType::Unknown => unknown(data),
        };
        Ok(payload)
    }

    /// An empty payload of the given kind, used to materialize a tombstone
    /// for an object we never saw alive.
    pub fn placeholder(object_type: ObjectType) -> Self {
        match object_type {
            ObjectType::Item => RecordPayload::Item(ItemData::default()),
            ObjectType::Variation => RecordPayload::Variation(VariationData::default()),
            ObjectType::Category => RecordPayload::Category(CategoryData::default()),
            ObjectType::Tax => RecordPayload::Tax(TaxData::default()),
            ObjectType::Modifier => RecordPayload::Modifier(ModifierData::default()),
            ObjectType::ModifierList => RecordPayload::ModifierList(ModifierListData::default()),
            ObjectType::Image => RecordPayload::Image(ImageData::default()),
            ObjectType::Discount => RecordPayload::Discount(DiscountData::default()),
            ObjectType::Unknown => RecordPayload::Unknown {
                type_name: ObjectType::Unknown.wire_name().to_string(),
                document: serde_json::Value::Null,
            },
        }
    }
}

fn unknown(data: &serde_json::Value) -> RecordPayload {
    RecordPayload::Unknown {
        type_name: super::unknown_type_name(data).to_string(),
        document: data.clone(),
    }
}

fn parse<T: DeserializeOwned>(data: &serde_json::Value) -> Result<T, PayloadError> {
    T::deserialize(data).map_err(|e| PayloadError::Malformed(e.to_string()))
}
