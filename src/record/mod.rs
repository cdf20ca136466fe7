//! Incoming catalog records - the unit the remote service streams to us.
//!
//! A [`CatalogRecord`] is a `(type, id, version, deleted, data)` tuple. The
//! `data` document is kept opaque until [`CatalogRecord::payload`] decodes it
//! into the typed [`RecordPayload`] union.

mod payload;
pub mod wire;

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

pub use payload::{
    CategoryData, DiscountData, ImageData, ItemData, ModifierData, ModifierListData, Money,
    RecordPayload, TaxData, VariationData,
};

/// The fixed set of catalog object kinds, plus a catch-all for kinds this
/// build does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Item,
    Variation,
    Category,
    Tax,
    Modifier,
    ModifierList,
    Image,
    Discount,
    Unknown,
}

impl ObjectType {
    /// Every kind that has typed storage and is counted in stats.
    pub const KNOWN: [ObjectType; 8] = [
        ObjectType::Item,
        ObjectType::Variation,
        ObjectType::Category,
        ObjectType::Tax,
        ObjectType::Modifier,
        ObjectType::ModifierList,
        ObjectType::Image,
        ObjectType::Discount,
    ];

    /// Name used by the remote service in the `type` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            ObjectType::Item => "ITEM",
            ObjectType::Variation => "ITEM_VARIATION",
            ObjectType::Category => "CATEGORY",
            ObjectType::Tax => "TAX",
            ObjectType::Modifier => "MODIFIER",
            ObjectType::ModifierList => "MODIFIER_LIST",
            ObjectType::Image => "IMAGE",
            ObjectType::Discount => "DISCOUNT",
            ObjectType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_wire_name(name: &str) -> ObjectType {
        ObjectType::KNOWN
            .into_iter()
            .find(|t| t.wire_name() == name)
            .unwrap_or(ObjectType::Unknown)
    }

    /// Key of the type-data document inside a remote object.
    pub fn data_key(self) -> Option<&'static str> {
        match self {
            ObjectType::Item => Some("item_data"),
            ObjectType::Variation => Some("item_variation_data"),
            ObjectType::Category => Some("category_data"),
            ObjectType::Tax => Some("tax_data"),
            ObjectType::Modifier => Some("modifier_data"),
            ObjectType::ModifierList => Some("modifier_list_data"),
            ObjectType::Image => Some("image_data"),
            ObjectType::Discount => Some("discount_data"),
            ObjectType::Unknown => None,
        }
    }

    /// Storage collection for entities of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            ObjectType::Item => "items",
            ObjectType::Variation => "variations",
            ObjectType::Category => "categories",
            ObjectType::Tax => "taxes",
            ObjectType::Modifier => "modifiers",
            ObjectType::ModifierList => "modifier_lists",
            ObjectType::Image => "images",
            ObjectType::Discount => "discounts",
            ObjectType::Unknown => "unknown_objects",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One versioned object as delivered by the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub object_type: ObjectType,
    pub id: String,
    pub version: i64,
    pub deleted: bool,
    /// The type-data document (`item_data` etc.). For unknown kinds this is
    /// the whole remote object.
    pub data: serde_json::Value,
}

impl CatalogRecord {
    pub fn new(
        object_type: ObjectType,
        id: impl Into<String>,
        version: i64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            object_type,
            id: id.into(),
            version,
            deleted: false,
            data,
        }
    }

    /// A soft-delete marker. Remote deletions usually arrive without data.
    pub fn tombstone(object_type: ObjectType, id: impl Into<String>, version: i64) -> Self {
        Self {
            object_type,
            id: id.into(),
            version,
            deleted: true,
            data: serde_json::Value::Null,
        }
    }

    /// Ties keep the current record, so replays are no-ops.
    pub fn is_newer_than(&self, current_version: i64) -> bool {
        self.version > current_version
    }

    /// Key the record is stored under. Unmodelled kinds share one
    /// collection, so their key carries the remote type name.
    pub fn storage_key(&self) -> Cow<'_, str> {
        match self.object_type {
            ObjectType::Unknown => {
                Cow::Owned(unknown_key(unknown_type_name(&self.data), &self.id))
            }
            _ => Cow::Borrowed(&self.id),
        }
    }

    /// Decode `data` into the typed payload for the declared kind.
    pub fn payload(&self) -> Result<RecordPayload, PayloadError> {
        RecordPayload::decode(self.object_type, &self.data)
    }
}

/// Storage key of an object of an unmodelled kind.
pub fn unknown_key(type_name: &str, id: &str) -> String {
    format!("{type_name}:{id}")
}

/// Remote type name carried by an unmodelled object.
pub(crate) fn unknown_type_name(data: &serde_json::Value) -> &str {
    data.get("type")
        .and_then(|v| v.as_str())
        .unwrap_or(ObjectType::Unknown.wire_name())
}
