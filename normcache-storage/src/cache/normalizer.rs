//! Flattening of operation data into records.
//!
//! The encoded data is walked against the operation's selection set. Every
//! object the key generator can identify becomes its own record and is
//! referenced from its parent; objects without a key are embedded inline in
//! the nearest keyed ancestor.

use indexmap::IndexMap;
use normcache_core::{
    CacheKey, CacheKeyGenerator, Field, FieldValue, ObjectContext, Record, RecordBatch, SelectionSet,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// The data did not match the selection set it was normalized against.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("at '{path}': {reason}")]
pub struct NormalizeError {
    pub path: String,
    pub reason: String,
}

/// Normalize `data`, the value of the record at `root`, into a batch of
/// records.
///
/// Nothing is produced unless the whole tree matches `selections`: a field
/// missing from the data or a scalar where an object was selected fails the
/// entire batch.
pub fn normalize(
    root: CacheKey,
    selections: &SelectionSet,
    data: &Value,
    key_generator: &dyn CacheKeyGenerator,
) -> Result<RecordBatch, NormalizeError> {
    let Value::Object(object) = data else {
        return Err(NormalizeError {
            path: root.to_string(),
            reason: format!("expected an object, found {}", kind(data)),
        });
    };

    let mut normalizer = Normalizer {
        key_generator,
        batch: RecordBatch::new(),
    };
    let path = root.to_string();
    normalizer.normalize_record(root, object, selections, &path)?;
    Ok(normalizer.batch)
}

struct Normalizer<'a> {
    key_generator: &'a dyn CacheKeyGenerator,
    batch: RecordBatch,
}

impl Normalizer<'_> {
    fn normalize_record(
        &mut self,
        key: CacheKey,
        object: &Map<String, Value>,
        selections: &SelectionSet,
        path: &str,
    ) -> Result<(), NormalizeError> {
        let fields = self.normalize_fields(&key, object, selections, path)?;
        let record = fields
            .into_iter()
            .fold(Record::new(key), |record, (name, value)| record.with_field(name, value));
        self.batch.insert(record);
        Ok(())
    }

    fn normalize_fields(
        &mut self,
        owner: &CacheKey,
        object: &Map<String, Value>,
        selections: &SelectionSet,
        path: &str,
    ) -> Result<IndexMap<String, FieldValue>, NormalizeError> {
        let mut fields = IndexMap::new();
        for field in selections {
            let field_path = format!("{path}.{}", field.response_key());
            let value = object.get(field.response_key()).ok_or_else(|| NormalizeError {
                path: field_path.clone(),
                reason: "field missing from data".to_string(),
            })?;

            let storage_key = field.storage_key();
            let normalized = self.normalize_value(owner, &storage_key, field, value, &field_path)?;
            merge_into(&mut fields, storage_key, normalized);
        }
        Ok(fields)
    }

    fn normalize_value(
        &mut self,
        owner: &CacheKey,
        storage_key: &str,
        field: &Field,
        value: &Value,
        path: &str,
    ) -> Result<FieldValue, NormalizeError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        if !field.is_composite() {
            return Ok(FieldValue::scalar(value.clone()));
        }

        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.normalize_value(owner, storage_key, field, item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            Value::Object(object) => {
                let typename = object
                    .get("__typename")
                    .and_then(Value::as_str)
                    .or(field.type_name.as_deref());
                let context = ObjectContext {
                    typename,
                    fields: object,
                    parent_key: owner,
                    field_key: storage_key,
                };

                match self.key_generator.key_for(&context) {
                    Some(key) => {
                        self.normalize_record(key.clone(), object, &field.selections, path)?;
                        Ok(FieldValue::Reference(key))
                    }
                    None => self
                        .normalize_fields(owner, object, &field.selections, path)
                        .map(FieldValue::Object),
                }
            }
            other => Err(NormalizeError {
                path: path.to_string(),
                reason: format!("expected an object, found {}", kind(other)),
            }),
        }
    }
}

/// Two selections of the same storage key (from overlapping fragments) are
/// folded together when both are inline objects.
fn merge_into(fields: &mut IndexMap<String, FieldValue>, name: String, value: FieldValue) {
    match (fields.get_mut(&name), value) {
        (Some(FieldValue::Object(existing)), FieldValue::Object(incoming)) => {
            for (child, child_value) in incoming {
                merge_into(existing, child, child_value);
            }
        }
        (_, value) => {
            fields.insert(name, value);
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
