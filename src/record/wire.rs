//! Decoding of remote catalog objects and pages.
//!
//! Only the minimal contract is understood: `type`, `id`, `version`,
//! `is_deleted` and the per-type `<kind>_data` document.

use serde_json::Value;
use tracing::warn;

use super::{CatalogRecord, ObjectType};
use crate::error::PayloadError;

/// One page of remote objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPage {
    pub records: Vec<CatalogRecord>,
    /// Opaque position of the next page, if any.
    pub cursor: Option<String>,
    /// Server watermark for later "changes since" queries.
    pub latest_time: Option<String>,
    /// Objects that could not be decoded and were dropped.
    pub rejected: usize,
}

pub fn decode_object(object: &Value) -> Result<CatalogRecord, PayloadError> {
    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(PayloadError::MissingField("type"))?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or(PayloadError::MissingField("id"))?;
    let version = object
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(PayloadError::MissingField("version"))?;
    let deleted = object
        .get("is_deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let object_type = ObjectType::from_wire_name(type_name);
    let data = match object_type.data_key() {
        Some(key) => match object.get(key) {
            Some(data) => data.clone(),
            None => {
                if let Some(actual) = foreign_data_key(object, key) {
                    return Err(PayloadError::TypeMismatch {
                        declared: type_name.to_string(),
                        actual,
                    });
                }
                Value::Null
            }
        },
        None => object.clone(),
    };

    Ok(CatalogRecord {
        object_type,
        id: id.to_string(),
        version,
        deleted,
        data,
    })
}

/// Decode `{ "objects": [...], "cursor": ..., "latest_time": ... }`.
/// Undecodable objects are logged and counted, never fatal.
pub fn decode_page(page: &Value) -> DecodedPage {
    let mut decoded = DecodedPage {
        cursor: page.get("cursor").and_then(Value::as_str).map(str::to_string),
        latest_time: page
            .get("latest_time")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..DecodedPage::default()
    };

    let objects = page
        .get("objects")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for object in objects {
        match decode_object(object) {
            Ok(record) => decoded.records.push(record),
            Err(err) => {
                warn!(error = %err, "dropping undecodable catalog object");
                decoded.rejected += 1;
            }
        }
    }
    decoded
}

/// The `<kind>_data` key of some other known kind, if the object carries one.
fn foreign_data_key(object: &Value, expected: &str) -> Option<String> {
    ObjectType::KNOWN
        .into_iter()
        .filter_map(ObjectType::data_key)
        .find(|key| *key != expected && object.get(*key).is_some())
        .map(str::to_string)
}
