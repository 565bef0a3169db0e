//! Normalized records and their field values.

use crate::key::CacheKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field of a normalized record.
///
/// Objects that have a cache key are stored as their own record and
/// referenced by key. Objects without one are embedded as `Object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    /// Any leaf value, including custom scalars that serialize to JSON objects.
    Scalar(Value),
    List(Vec<FieldValue>),
    /// Keyless object embedded in its parent record.
    Object(IndexMap<String, FieldValue>),
    Reference(CacheKey),
}

impl FieldValue {
    pub fn scalar(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Self::Null,
            other => Self::Scalar(other),
        }
    }

    pub fn reference(key: impl Into<CacheKey>) -> Self {
        Self::Reference(key.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_reference(&self) -> Option<&CacheKey> {
        match self {
            Self::Reference(key) => Some(key),
            _ => None,
        }
    }

    /// Collect every key referenced from this value, including nested lists
    /// and embedded objects.
    pub fn collect_references(&self, out: &mut Vec<CacheKey>) {
        match self {
            Self::Reference(key) => out.push(key.clone()),
            Self::List(items) => items.iter().for_each(|item| item.collect_references(out)),
            Self::Object(fields) => fields.values().for_each(|v| v.collect_references(out)),
            Self::Null | Self::Scalar(_) => {}
        }
    }
}

/// Flat field map representing one normalized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: CacheKey,
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge `other` into this record field by field.
    ///
    /// Incoming fields overwrite same-named existing ones, new fields are
    /// added and fields absent from `other` are kept. Returns the names of
    /// fields that were added or whose value changed.
    pub fn merge(&mut self, other: Record) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, value) in other.fields {
            match self.fields.get(&name) {
                Some(existing) if *existing == value => {}
                _ => {
                    changed.push(name.clone());
                    self.fields.insert(name, value);
                }
            }
        }
        changed
    }

    /// Keys this record references directly.
    pub fn references(&self) -> Vec<CacheKey> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_references(&mut out);
        }
        out
    }
}

/// The records produced by normalizing one operation, keyed and deduplicated.
///
/// Adding a record whose key is already present merges it into the
/// existing entry, so a batch never holds two records for one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    records: IndexMap<CacheKey, Record>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        match self.records.get_mut(record.key()) {
            Some(existing) => {
                existing.merge(record);
            }
            None => {
                self.records.insert(record.key().clone(), record);
            }
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for RecordBatch {
    type Item = Record;
    type IntoIter = indexmap::map::IntoValues<CacheKey, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

impl FromIterator<Record> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut batch = Self::new();
        for record in iter {
            batch.insert(record);
        }
        batch
    }
}
