//! Resolved selection shapes.
//!
//! Operations hand the cache an already-resolved shape: which fields are
//! selected, under which response key, with which argument values. The
//! normalizer and denormalizer both walk this shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A selected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    /// Resolved argument values (variables already substituted).
    pub arguments: BTreeMap<String, Value>,
    /// Declared type of a composite field, used when the data carries no `__typename`.
    pub type_name: Option<String>,
    /// Empty for leaf fields.
    pub selections: SelectionSet,
}

impl Field {
    /// A leaf field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: BTreeMap::new(),
            type_name: None,
            selections: SelectionSet::default(),
        }
    }

    /// A composite field with its own selections.
    pub fn object(name: impl Into<String>, type_name: impl Into<String>, selections: SelectionSet) -> Self {
        Self {
            type_name: Some(type_name.into()),
            selections,
            ..Self::scalar(name)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Key under which the field appears in response data.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Key under which the field is stored in a record.
    ///
    /// `hero` without arguments, `hero({"episode":"EMPIRE"})` with them.
    /// Arguments are written in sorted order at every nesting level, so the
    /// same logical arguments always produce the same key.
    pub fn storage_key(&self) -> String {
        if self.arguments.is_empty() {
            return self.name.clone();
        }
        let args: Map<String, Value> = self
            .arguments
            .iter()
            .map(|(name, value)| (name.clone(), canonical(value)))
            .collect();
        format!("{}({})", self.name, Value::Object(args))
    }

    pub fn is_composite(&self) -> bool {
        !self.selections.is_empty()
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Ordered list of selected fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    fields: Vec<Field>,
}

impl SelectionSet {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
