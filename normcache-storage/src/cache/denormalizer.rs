//! Reassembly of operation data from records.

use normcache_core::{CacheError, CacheKey, DependencySet, Field, FieldValue, SelectionSet};
use serde_json::{Map, Value};

use super::normalized::RecordMap;

/// Outcome of walking a selection set over a snapshot.
///
/// `dependencies` holds every key the walk visited, including the key whose
/// absence ended it on a miss, so a partial read still tells a watcher
/// which writes could complete it.
#[derive(Debug, Clone, PartialEq)]
pub struct Denormalized {
    pub data: Result<Value, CacheError>,
    pub dependencies: DependencySet,
}

/// Read `selections` starting at the record `root`.
///
/// References are followed only as far as the selection set reaches, so
/// cyclic record graphs are walked in finite time.
pub fn denormalize(root: &CacheKey, selections: &SelectionSet, records: &RecordMap) -> Denormalized {
    let mut walker = Denormalizer {
        records,
        dependencies: DependencySet::new(),
    };
    let data = walker.read_record(root, selections);
    Denormalized {
        data,
        dependencies: walker.dependencies,
    }
}

struct Denormalizer<'a> {
    records: &'a RecordMap,
    dependencies: DependencySet,
}

impl<'a> Denormalizer<'a> {
    fn read_record(&mut self, key: &CacheKey, selections: &SelectionSet) -> Result<Value, CacheError> {
        self.dependencies.insert(key.clone());
        let records = self.records;
        let record = records
            .get(key)
            .ok_or_else(|| CacheError::MissingRecord { key: key.clone() })?;
        self.read_fields(key, "", &|name| record.field(name), selections)
    }

    /// `prefix` locates inline objects inside their owning record for
    /// error reporting.
    fn read_fields(
        &mut self,
        owner: &CacheKey,
        prefix: &str,
        lookup: &dyn Fn(&str) -> Option<&'a FieldValue>,
        selections: &SelectionSet,
    ) -> Result<Value, CacheError> {
        let mut object = Map::new();
        for field in selections {
            let storage_key = field.storage_key();
            let path = if prefix.is_empty() {
                storage_key.clone()
            } else {
                format!("{prefix}.{storage_key}")
            };
            let value = lookup(&storage_key).ok_or_else(|| CacheError::MissingField {
                key: owner.clone(),
                field: path.clone(),
            })?;
            let resolved = self.read_value(owner, &path, value, field)?;
            object.insert(field.response_key().to_string(), resolved);
        }
        Ok(Value::Object(object))
    }

    fn read_value(
        &mut self,
        owner: &CacheKey,
        path: &str,
        value: &'a FieldValue,
        field: &Field,
    ) -> Result<Value, CacheError> {
        match value {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Scalar(scalar) => Ok(scalar.clone()),
            FieldValue::List(items) => items
                .iter()
                .map(|item| self.read_value(owner, path, item, field))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            FieldValue::Reference(key) if field.is_composite() => self.read_record(key, &field.selections),
            FieldValue::Object(fields) if field.is_composite() => {
                self.read_fields(owner, path, &|name| fields.get(name), &field.selections)
            }
            // Leaf selection over structured data: hand the stored shape back as-is.
            FieldValue::Reference(key) => Ok(Value::String(key.to_string())),
            FieldValue::Object(_) => Ok(plain(value)),
        }
    }
}

fn plain(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Scalar(scalar) => scalar.clone(),
        FieldValue::List(items) => Value::Array(items.iter().map(plain).collect()),
        FieldValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), plain(value)))
                .collect(),
        ),
        FieldValue::Reference(key) => Value::String(key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::normalizer::normalize;
    use normcache_core::{IdCacheKeyGenerator, Record};
    use serde_json::json;

    fn hero_and_friends() -> SelectionSet {
        SelectionSet::new(vec![Field::object(
            "hero",
            "Character",
            SelectionSet::new(vec![
                Field::scalar("id"),
                Field::scalar("name"),
                Field::object(
                    "friends",
                    "Character",
                    SelectionSet::new(vec![Field::scalar("id"), Field::scalar("name")]),
                ),
            ]),
        )])
    }

    fn records_for(selections: &SelectionSet, data: &Value) -> RecordMap {
        normalize(CacheKey::query_root(), selections, data, &IdCacheKeyGenerator::new())
            .unwrap()
            .into_iter()
            .map(|r| (r.key().clone(), r))
            .collect()
    }

    #[test]
    fn test_reads_back_what_was_normalized() {
        let data = json!({
            "hero": {
                "id": "2001",
                "name": "R2-D2",
                "friends": [
                    {"id": "1000", "name": "Luke Skywalker"},
                    {"id": "1003", "name": "Leia Organa"}
                ]
            }
        });
        let selections = hero_and_friends();
        let records = records_for(&selections, &data);

        let read = denormalize(&CacheKey::query_root(), &selections, &records);
        assert_eq!(read.data.unwrap(), data);

        let expected: DependencySet = ["QUERY_ROOT", "2001", "1000", "1003"]
            .into_iter()
            .map(CacheKey::new)
            .collect();
        assert_eq!(read.dependencies, expected);
    }

    #[test]
    fn test_inline_objects_read_back() {
        let selections = SelectionSet::new(vec![Field::object(
            "hero",
            "Character",
            SelectionSet::new(vec![Field::scalar("name")]),
        )]);
        let data = json!({"hero": {"name": "R2-D2"}});
        let records = records_for(&selections, &data);

        let read = denormalize(&CacheKey::query_root(), &selections, &records);
        assert_eq!(read.data.unwrap(), data);
        assert_eq!(read.dependencies.len(), 1);
    }

    #[test]
    fn test_missing_record_reports_partial_dependencies() {
        let mut records = RecordMap::new();
        records.insert(
            CacheKey::query_root(),
            Record::new(CacheKey::query_root()).with_field("hero", FieldValue::reference("2001")),
        );

        let read = denormalize(&CacheKey::query_root(), &hero_and_friends(), &records);
        assert_eq!(
            read.data,
            Err(CacheError::MissingRecord {
                key: CacheKey::new("2001")
            })
        );
        assert!(read.dependencies.contains(&CacheKey::query_root()));
        assert!(read.dependencies.contains(&CacheKey::new("2001")));
    }

    #[test]
    fn test_missing_field_names_the_record() {
        let mut records = RecordMap::new();
        records.insert(
            CacheKey::query_root(),
            Record::new(CacheKey::query_root()).with_field("hero", FieldValue::reference("2001")),
        );
        records.insert(
            CacheKey::new("2001"),
            Record::new(CacheKey::new("2001"))
                .with_field("id", FieldValue::scalar("2001"))
                .with_field("name", FieldValue::scalar("R2-D2")),
        );

        let read = denormalize(&CacheKey::query_root(), &hero_and_friends(), &records);
        assert_eq!(
            read.data,
            Err(CacheError::MissingField {
                key: CacheKey::new("2001"),
                field: "friends".to_string()
            })
        );
    }

    #[test]
    fn test_empty_store_misses_on_root() {
        let read = denormalize(&CacheKey::query_root(), &hero_and_friends(), &RecordMap::new());
        assert!(matches!(read.data, Err(CacheError::MissingRecord { .. })));
        assert_eq!(read.dependencies.len(), 1);
    }

    #[test]
    fn test_cyclic_references_terminate() {
        let mut records = RecordMap::new();
        records.insert(
            CacheKey::query_root(),
            Record::new(CacheKey::query_root()).with_field("hero", FieldValue::reference("a")),
        );
        records.insert(
            CacheKey::new("a"),
            Record::new(CacheKey::new("a"))
                .with_field("name", FieldValue::scalar("A"))
                .with_field("friend", FieldValue::reference("b")),
        );
        records.insert(
            CacheKey::new("b"),
            Record::new(CacheKey::new("b"))
                .with_field("name", FieldValue::scalar("B"))
                .with_field("friend", FieldValue::reference("a")),
        );

        let friend_of_friend = Field::object(
            "friend",
            "Character",
            SelectionSet::new(vec![Field::object(
                "friend",
                "Character",
                SelectionSet::new(vec![Field::scalar("name")]),
            )]),
        );
        let selections = SelectionSet::new(vec![Field::object(
            "hero",
            "Character",
            SelectionSet::new(vec![Field::scalar("name"), friend_of_friend]),
        )]);

        let read = denormalize(&CacheKey::query_root(), &selections, &records);
        assert_eq!(
            read.data.unwrap(),
            json!({"hero": {"name": "A", "friend": {"friend": {"name": "A"}}}})
        );
    }
}
