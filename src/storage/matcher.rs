use std::cmp::Ordering;
use regex::{Regex, RegexBuilder};
use serde_json::Value as JsonValue;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::document_store::JsonMap;

/// Parsed Mongo-style query document
#[derive(Debug, Clone)]
pub enum DocumentFilter {
    MatchAll,
    And(Vec<DocumentFilter>),
    Or(Vec<DocumentFilter>),
    Nor(Vec<DocumentFilter>),
    Field {
        field: String,
        conditions: Vec<Condition>,
    },
}

/// One operator applied to a field
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(JsonValue),
    Ne(JsonValue),
    Gt(JsonValue),
    Gte(JsonValue),
    Lt(JsonValue),
    Lte(JsonValue),
    In(Vec<JsonValue>),
    Nin(Vec<JsonValue>),
    Regex(Regex),
}

impl DocumentFilter {
    pub fn parse(selector: &JsonValue) -> Result<Self> {
        let object = selector
            .as_object()
            .ok_or_else(|| parse_error(format!("query must be an object, got {}", selector)))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            clauses.push(match key.as_str() {
                "$and" => DocumentFilter::And(parse_list(key, value)?),
                "$or" => DocumentFilter::Or(parse_list(key, value)?),
                "$nor" => DocumentFilter::Nor(parse_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(parse_error(format!("unsupported top-level operator '{}'", op)))
                }
                field => DocumentFilter::Field {
                    field: field.to_string(),
                    conditions: parse_conditions(value)?,
                },
            });
        }

        Ok(match clauses.len() {
            0 => DocumentFilter::MatchAll,
            1 => clauses.remove(0),
            _ => DocumentFilter::And(clauses),
        })
    }

    pub fn matches(&self, doc: &JsonMap) -> bool {
        match self {
            DocumentFilter::MatchAll => true,
            DocumentFilter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            DocumentFilter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            DocumentFilter::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            DocumentFilter::Field { field, conditions } => {
                let value = doc.get(field).unwrap_or(&JsonValue::Null);
                conditions.iter().all(|condition| condition.matches(value))
            }
        }
    }
}

impl Condition {
    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            Condition::Eq(expected) => equals(value, expected),
            Condition::Ne(expected) => !equals(value, expected),
            Condition::Gt(bound) => ordered(value, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => ordered(value, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => ordered(value, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => ordered(value, bound, |o| o != Ordering::Greater),
            Condition::In(list) => list.iter().any(|expected| equals(value, expected)),
            Condition::Nin(list) => !list.iter().any(|expected| equals(value, expected)),
            Condition::Regex(regex) => match value {
                JsonValue::String(s) => regex.is_match(s),
                JsonValue::Array(items) => items
                    .iter()
                    .any(|item| item.as_str().map_or(false, |s| regex.is_match(s))),
                _ => false,
            },
        }
    }
}

fn parse_list(op: &str, value: &JsonValue) -> Result<Vec<DocumentFilter>> {
    value
        .as_array()
        .ok_or_else(|| parse_error(format!("'{}' expects an array", op)))?
        .iter()
        .map(DocumentFilter::parse)
        .collect()
}

fn parse_conditions(value: &JsonValue) -> Result<Vec<Condition>> {
    let object = match value.as_object() {
        Some(object) if !object.is_empty() && object.keys().all(|k| k.starts_with('$')) => object,
        // Plain value means equality
        _ => return Ok(vec![Condition::Eq(value.clone())]),
    };

    let mut conditions = Vec::with_capacity(object.len());
    for (op, operand) in object {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" => Condition::In(operand_list(op, operand)?),
            "$nin" => Condition::Nin(operand_list(op, operand)?),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| parse_error("'$regex' expects a string".to_string()))?;
                let options = object.get("$options").and_then(JsonValue::as_str).unwrap_or("");
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .dot_matches_new_line(options.contains('s'))
                    .build()
                    .map_err(|e| parse_error(format!("invalid regex '{}': {}", pattern, e)))?;
                Condition::Regex(regex)
            }
            "$options" => continue,
            other => return Err(parse_error(format!("unsupported operator '{}'", other))),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn operand_list(op: &str, operand: &JsonValue) -> Result<Vec<JsonValue>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| parse_error(format!("'{}' expects an array", op)))
}

fn parse_error(context: String) -> Error {
    Error::new(ErrorKind::Parse, context)
}

/// Array fields match when any element (or the whole array) equals
fn equals(value: &JsonValue, expected: &JsonValue) -> bool {
    if scalar_equals(value, expected) {
        return true;
    }
    match value {
        JsonValue::Array(items) => items.iter().any(|item| scalar_equals(item, expected)),
        _ => false,
    }
}

fn scalar_equals(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordered(value: &JsonValue, bound: &JsonValue, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |item: &JsonValue| same_kind_cmp(item, bound).map_or(false, &accept);
    match value {
        JsonValue::Array(items) => items.iter().any(check),
        other => check(other),
    }
}

/// Ordering between values of the same JSON kind; mixed kinds never compare
fn same_kind_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting and distinct: null < bool < number < string < array < object
pub fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    fn rank(value: &JsonValue) -> u8 {
        match value {
            JsonValue::Null => 0,
            JsonValue::Bool(_) => 1,
            JsonValue::Number(_) => 2,
            JsonValue::String(_) => 3,
            JsonValue::Array(_) => 4,
            JsonValue::Object(_) => 5,
        }
    }

    if let Some(ordering) = same_kind_cmp(a, b) {
        return ordering;
    }
    match (a, b) {
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                let ordering = compare_json(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn boolean_trees() {
        let filter = DocumentFilter::parse(&json!({
            "$and": [
                {"x": {"$eq": 1}},
                {"$or": [{"z": {"$eq": 3}}, {"w": {"$eq": 4}}]}
            ]
        }))
        .unwrap();

        assert!(filter.matches(&doc(json!({"x": 1, "w": 4}))));
        assert!(filter.matches(&doc(json!({"x": 1.0, "z": 3}))));
        assert!(!filter.matches(&doc(json!({"x": 1, "z": 5}))));
        assert!(!filter.matches(&doc(json!({"x": 2, "z": 3}))));
    }

    #[test]
    fn arrays_match_any_element() {
        let filter = DocumentFilter::parse(&json!({"tags": {"$eq": "red"}})).unwrap();
        assert!(filter.matches(&doc(json!({"tags": ["blue", "red"]}))));
        assert!(!filter.matches(&doc(json!({"tags": ["blue"]}))));

        let filter = DocumentFilter::parse(&json!({"$nor": [{"tags": {"$eq": "red"}}]})).unwrap();
        assert!(filter.matches(&doc(json!({"tags": ["blue"]}))));
        assert!(filter.matches(&doc(json!({}))));
    }

    #[test]
    fn ranges_regex_and_missing_fields() {
        let filter = DocumentFilter::parse(&json!({"qty": {"$gte": 5, "$lt": 10}})).unwrap();
        assert!(filter.matches(&doc(json!({"qty": 5}))));
        assert!(!filter.matches(&doc(json!({"qty": 10}))));
        assert!(!filter.matches(&doc(json!({"qty": "7"}))));
        assert!(!filter.matches(&doc(json!({}))));

        let filter =
            DocumentFilter::parse(&json!({"name": {"$regex": "^.*BOLT.*$", "$options": "i"}})).unwrap();
        assert!(filter.matches(&doc(json!({"name": "hex bolt"}))));

        let filter = DocumentFilter::parse(&json!({"name": {"$eq": null}})).unwrap();
        assert!(filter.matches(&doc(json!({}))));

        assert!(DocumentFilter::parse(&json!({"$where": "1"})).is_err());
    }
}
