use std::collections::{BTreeMap, HashMap};
use serde_json::Value as JsonValue;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Value, ID_COLUMN};
use crate::query::plan::SortKey;
use crate::schema::coerce::{coerce, plain_json};
use crate::schema::column::ColumnType;
use crate::storage::matcher::{compare_json, DocumentFilter};

pub type JsonMap = serde_json::Map<String, JsonValue>;

/// Options for `find`
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions<'a> {
    pub sort: &'a [SortKey],
    pub skip: usize,
    pub limit: usize,             // 0 = unlimited
    pub projection: &'a [String], // empty = whole document
}

/// Documents of one collection keyed by `_id`
#[derive(Debug, Clone, Default)]
struct DocumentCollection {
    documents: BTreeMap<String, JsonMap>,
}

/// In-process document store evaluating Mongo-style filters
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: HashMap<String, DocumentCollection>,
}

impl DocumentStore {
    pub fn new() -> Self {
        DocumentStore {
            collections: HashMap::new(),
        }
    }

    /// Returns false if the collection already existed
    pub fn create_collection(&mut self, name: &str) -> bool {
        if self.collections.contains_key(name) {
            return false;
        }
        self.collections.insert(name.to_string(), DocumentCollection::default());
        true
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Merge `fields` into the document `id`, creating it if needed
    pub fn upsert(&mut self, collection: &str, id: &str, fields: JsonMap) -> Result<()> {
        let document = self
            .collection_mut(collection)?
            .documents
            .entry(id.to_string())
            .or_default();
        document.extend(fields);
        document.insert(ID_COLUMN.to_string(), JsonValue::String(id.to_string()));
        Ok(())
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        options: &FindOptions<'_>,
    ) -> Result<Vec<JsonMap>> {
        let mut matched: Vec<&JsonMap> = self
            .collection(collection)?
            .documents
            .values()
            .filter(|doc| filter.matches(doc))
            .collect();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| {
                for key in options.sort {
                    let left = a.get(&key.column).unwrap_or(&JsonValue::Null);
                    let right = b.get(&key.column).unwrap_or(&JsonValue::Null);
                    let ordering = compare_json(left, right);
                    let ordering = if key.descending { ordering.reverse() } else { ordering };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let limit = if options.limit == 0 { usize::MAX } else { options.limit };
        Ok(matched
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|doc| project(doc, options.projection))
            .collect())
    }

    pub fn count(&self, collection: &str, filter: &DocumentFilter) -> Result<usize> {
        Ok(self
            .collection(collection)?
            .documents
            .values()
            .filter(|doc| filter.matches(doc))
            .count())
    }

    /// Distinct values of `field` among matching documents, ascending
    pub fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<JsonValue>> {
        let mut values: Vec<JsonValue> = Vec::new();
        for doc in self.collection(collection)?.documents.values() {
            if !filter.matches(doc) {
                continue;
            }
            let value = doc.get(field).cloned().unwrap_or(JsonValue::Null);
            if !values.iter().any(|seen| compare_json(seen, &value).is_eq()) {
                values.push(value);
            }
        }
        values.sort_by(compare_json);
        Ok(values)
    }

    /// Ids of the matching documents, in id order
    pub fn matching_ids(&self, collection: &str, filter: &DocumentFilter) -> Result<Vec<String>> {
        Ok(self
            .collection(collection)?
            .documents
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect())
    }

    pub fn delete(&mut self, collection: &str, ids: &[String]) -> Result<usize> {
        let documents = &mut self.collection_mut(collection)?.documents;
        Ok(ids.iter().filter(|id| documents.remove(id.as_str()).is_some()).count())
    }

    pub fn remove_field(&mut self, collection: &str, field: &str) -> Result<()> {
        for doc in self.collection_mut(collection)?.documents.values_mut() {
            doc.remove(field);
        }
        Ok(())
    }

    pub fn len(&self, collection: &str) -> Result<usize> {
        Ok(self.collection(collection)?.documents.len())
    }

    fn collection(&self, name: &str) -> Result<&DocumentCollection> {
        self.collections.get(name).ok_or_else(|| unknown_collection(name))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut DocumentCollection> {
        self.collections.get_mut(name).ok_or_else(|| unknown_collection(name))
    }
}

fn unknown_collection(name: &str) -> Error {
    Error::new(
        ErrorKind::UnknownCollection,
        format!("no document collection '{}'", name),
    )
}

fn project(doc: &JsonMap, projection: &[String]) -> JsonMap {
    if projection.is_empty() {
        return doc.clone();
    }
    projection
        .iter()
        .filter_map(|field| doc.get(field).map(|value| (field.clone(), value.clone())))
        .collect()
}

/// Stored form of an already coerced value
pub fn to_document_value(value: &Value) -> JsonValue {
    plain_json(value)
}

/// Typed read of a stored value using column metadata
pub fn from_document_value(value: &JsonValue, column_type: &ColumnType) -> Result<Value> {
    match column_type {
        ColumnType::Json => Ok(Value::Json(value.clone())),
        column_type => coerce(json_to_value(value), column_type),
    }
}

/// Read without metadata (raw queries)
pub fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        JsonValue::Object(_) => Value::Json(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn upsert_merges_fields() {
        let mut store = DocumentStore::new();
        store.create_collection("items");
        store.upsert("items", "a", fields(json!({"qty": 1, "name": "bolt"}))).unwrap();
        store.upsert("items", "a", fields(json!({"qty": 2}))).unwrap();

        let docs = store.find("items", &DocumentFilter::MatchAll, &FindOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("qty"), Some(&json!(2)));
        assert_eq!(docs[0].get("name"), Some(&json!("bolt")));
        assert_eq!(docs[0].get(ID_COLUMN), Some(&json!("a")));
    }

    #[test]
    fn sort_skip_limit_and_distinct() {
        let mut store = DocumentStore::new();
        store.create_collection("items");
        for (id, qty) in [("a", 3), ("b", 1), ("c", 2), ("d", 1)] {
            store.upsert("items", id, fields(json!({ "qty": qty }))).unwrap();
        }

        let sort = [SortKey {
            column: "qty".to_string(),
            descending: true,
        }];
        let options = FindOptions {
            sort: &sort,
            skip: 1,
            limit: 2,
            projection: &[],
        };
        let docs = store.find("items", &DocumentFilter::MatchAll, &options).unwrap();
        let qty: Vec<&JsonValue> = docs.iter().map(|d| &d["qty"]).collect();
        assert_eq!(qty, vec![&json!(2), &json!(1)]);

        let values = store.distinct("items", "qty", &DocumentFilter::MatchAll).unwrap();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);

        assert!(store.find("missing", &DocumentFilter::MatchAll, &options).is_err());
    }

    #[test]
    fn typed_reads() {
        assert_eq!(
            from_document_value(&json!("12"), &ColumnType::Integer).unwrap(),
            Value::Integer(12)
        );
        assert_eq!(
            from_document_value(&json!(["a", "b"]), &ColumnType::Array(Box::new(ColumnType::Text)))
                .unwrap(),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            from_document_value(&json!({"k": 1}), &ColumnType::Json).unwrap(),
            Value::Json(json!({"k": 1}))
        );
    }
}
