//! Records and their on-disk JSON format.
//!
//! A record is stored as a flat JSON object with the reserved fields inline:
//! ```text
//! {
//!   "id": "01j9z3...",
//!   "createdAt": "2024-05-01T10:00:00Z",
//!   "updatedAt": "2024-05-01T10:00:00Z",
//!   "name": "Alice",
//!   "age": 30
//! }
//! ```
//! User fields live in a `BTreeMap` so files serialize with stable key order,
//! which keeps snapshot diffs minimal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::RecordId;

/// user-supplied field values
pub type Fields = BTreeMap<String, Value>;

/// field names the store owns; callers can't overwrite them
pub const RESERVED_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

/// a stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// creates a new record; both timestamps are set to the same instant
    pub fn new(id: RecordId, fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            fields: strip_reserved(fields),
        }
    }

    /// shallow merge: supplied fields replace prior values, others are kept
    pub fn merge(&mut self, updates: Fields) {
        self.fields.extend(strip_reserved(updates));
        self.updated_at = Utc::now();
    }

    /// get a field value by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn to_value(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Convert a JSON payload into fields.
///
/// The payload must be an object. An `id` string, if present, is returned
/// separately so `create` can honor caller-chosen ids.
pub fn split_payload(value: Value) -> StoreResult<(Option<RecordId>, Fields)> {
    let mut fields = object_fields(value)?;
    let id = match fields.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(RecordId::new(s)?),
        Some(other) => {
            return Err(StoreError::InvalidRecord(format!(
                "record id must be a string, got {}",
                other
            )))
        }
    };

    Ok((id, strip_reserved(fields)))
}

/// Convert an update payload into fields, dropping reserved ones.
pub fn update_fields(value: Value) -> StoreResult<Fields> {
    object_fields(value).map(strip_reserved)
}

fn object_fields(value: Value) -> StoreResult<Fields> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(StoreError::InvalidRecord(
            "record data must be a JSON object".to_string(),
        )),
    }
}

fn strip_reserved(mut fields: Fields) -> Fields {
    for name in RESERVED_FIELDS {
        fields.remove(*name);
    }
    fields
}

/// serialize a collection to JSON bytes
pub fn serialize_collection(records: &[Record]) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// deserialize a collection from JSON bytes
pub fn deserialize_collection(bytes: &[u8]) -> StoreResult<Vec<Record>> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        split_payload(value).unwrap().1
    }

    #[test]
    fn test_record_creation() {
        let id = RecordId::new("test123").unwrap();
        let record = Record::new(id.clone(), fields(json!({"name": "Alice", "age": 30})));

        assert_eq!(record.id, id);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_serialization_format() {
        let record = Record::new(RecordId::new("abc").unwrap(), fields(json!({"name": "A"})));
        let value = record.to_value().unwrap();

        assert_eq!(value["id"], json!("abc"));
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["name"], json!("A"));
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn test_collection_roundtrip() {
        let records = vec![
            Record::new(RecordId::new("b").unwrap(), fields(json!({"n": 2}))),
            Record::new(RecordId::new("a").unwrap(), fields(json!({"n": 1}))),
        ];
        let bytes = serialize_collection(&records).unwrap();
        let restored = deserialize_collection(&bytes).unwrap();
        assert_eq!(restored, records);
    }

    #[test]
    fn test_split_payload() {
        let (id, f) = split_payload(json!({"id": "u1", "createdAt": "x", "name": "A"})).unwrap();
        assert_eq!(id, Some(RecordId::new("u1").unwrap()));
        assert_eq!(f.len(), 1);

        let (id, _) = split_payload(json!({"name": "A"})).unwrap();
        assert_eq!(id, None);

        assert!(matches!(
            split_payload(json!([1, 2])),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            split_payload(json!({"id": 7})),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            split_payload(json!({"id": "bad id"})),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_update_fields_ignores_reserved() {
        let f = update_fields(json!({"id": 7, "updatedAt": "x", "age": 31})).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("age"), Some(&json!(31)));
        assert!(update_fields(json!("nope")).is_err());
    }

    #[test]
    fn test_merge_is_shallow_and_keeps_id() {
        let mut record = Record::new(
            RecordId::new("r1").unwrap(),
            fields(json!({"name": "A", "address": {"city": "X", "zip": "1"}})),
        );
        let created = record.created_at;

        let mut updates = Fields::new();
        updates.insert("address".to_string(), json!({"city": "Y"}));
        updates.insert("id".to_string(), json!("hijack"));
        record.merge(updates);

        assert_eq!(record.id.as_str(), "r1");
        assert_eq!(record.created_at, created);
        assert_eq!(record.get("name"), Some(&json!("A")));
        assert_eq!(record.get("address"), Some(&json!({"city": "Y"})));
        assert!(record.updated_at >= created);
    }
}
