use std::sync::Arc;
use serde_json::json;
use Seldex::core::error::{ErrorKind, Result};
use Seldex::core::types::Value;
use Seldex::filter::group::{FilterTree, DEFAULT_GROUP};
use Seldex::filter::operand::Operator;
use Seldex::query::compiler::QueryCompiler;
use Seldex::query::document::{DocumentCompiler, SubqueryResolver};
use Seldex::query::subquery::SubQuery;
use Seldex::query::translate::OperatorTranslator;
use Seldex::schema::column::{CollectionSchema, ColumnDefinition, ColumnType};

fn schema() -> CollectionSchema {
    CollectionSchema::with_columns(
        "items",
        vec![
            ColumnDefinition::new("x", ColumnType::Integer),
            ColumnDefinition::new("y", ColumnType::Integer),
            ColumnDefinition::new("z", ColumnType::Integer),
            ColumnDefinition::new("w", ColumnType::Integer),
            ColumnDefinition::new("name", ColumnType::Text),
            ColumnDefinition::new("tags", ColumnType::Array(Box::new(ColumnType::Text))),
        ],
    )
    .unwrap()
}

fn compiler<'r>() -> DocumentCompiler<'r> {
    DocumentCompiler::new(OperatorTranslator::default())
}

/// Resolves every sub-query to the same fixed values
struct FixedResolver(Vec<Value>);

impl SubqueryResolver for FixedResolver {
    fn resolve(&self, _subquery: &SubQuery) -> Result<Vec<Value>> {
        Ok(self.0.clone())
    }
}

fn orders_subquery() -> SubQuery {
    let orders = Arc::new(
        CollectionSchema::with_columns("orders", vec![ColumnDefinition::new("item", ColumnType::Text)]).unwrap(),
    );
    SubQuery::new(orders, FilterTree::new(), vec!["item".to_string()]).unwrap()
}

#[test]
fn test_nested_groups_become_nested_operators() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.setup_group("a", false, "").unwrap();
    tree.setup_group("b", true, "a").unwrap();
    tree.add_filter(&schema, "a", "x", Operator::Eq, 1i64.into()).unwrap();
    tree.add_filter(&schema, "a", "y", Operator::Eq, 2i64.into()).unwrap();
    tree.add_filter(&schema, "b", "z", Operator::Eq, 3i64.into()).unwrap();
    tree.add_filter(&schema, "b", "w", Operator::Eq, 4i64.into()).unwrap();

    let selector = compiler().compile(&schema, &tree).unwrap();
    assert_eq!(
        selector,
        json!({"$and": [
            {"x": {"$eq": 1}},
            {"y": {"$eq": 2}},
            {"$or": [{"z": {"$eq": 3}}, {"w": {"$eq": 4}}]}
        ]})
    );
}

#[test]
fn test_empty_tree_is_empty_query() {
    let schema = schema();
    assert_eq!(compiler().compile(&schema, &FilterTree::new()).unwrap(), json!({}));
}

#[test]
fn test_values_are_coerced_before_rendering() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "x", Operator::Gte, "10".into()).unwrap();

    let selector = compiler().compile(&schema, &tree).unwrap();
    assert_eq!(selector, json!({"x": {"$gte": 10}}));
}

#[test]
fn test_like_becomes_case_insensitive_multiline_regex() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "name", Operator::Like, "bolt".into()).unwrap();

    let selector = compiler().compile(&schema, &tree).unwrap();
    assert_eq!(selector, json!({"name": {"$regex": "^.*bolt.*$", "$options": "is"}}));
}

#[test]
fn test_membership_operators() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.setup_group("any", true, "").unwrap();
    tree.add_filter(&schema, "any", "x", Operator::In, vec![1i64, 2i64].into()).unwrap();
    tree.add_filter(&schema, "any", "name", Operator::Nin, vec!["a"].into()).unwrap();

    let selector = compiler().compile(&schema, &tree).unwrap();
    assert_eq!(
        selector,
        json!({"$or": [{"x": {"$in": [1, 2]}}, {"name": {"$nin": ["a"]}}]})
    );
}

#[test]
fn test_array_membership_checks_each_element() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "tags", Operator::Nin, vec!["red", "blue"].into()).unwrap();

    let selector = compiler().compile(&schema, &tree).unwrap();
    assert_eq!(
        selector,
        json!({"$nor": [{"tags": {"$eq": "red"}}, {"tags": {"$eq": "blue"}}]})
    );
}

#[test]
fn test_subquery_is_resolved_while_compiling() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "name", Operator::In, orders_subquery().into()).unwrap();

    let resolver = FixedResolver(vec![Value::from("bolt"), Value::from("nut")]);
    let selector = compiler().with_resolver(&resolver).compile(&schema, &tree).unwrap();
    assert_eq!(selector, json!({"name": {"$in": ["bolt", "nut"]}}));
}

#[test]
fn test_subquery_values_are_coerced_to_outer_column() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "x", Operator::Nin, orders_subquery().into()).unwrap();

    let resolver = FixedResolver(vec![Value::from("7")]);
    let selector = compiler().with_resolver(&resolver).compile(&schema, &tree).unwrap();
    assert_eq!(selector, json!({"x": {"$nin": [7]}}));
}

#[test]
fn test_subquery_without_resolver() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.add_filter(&schema, DEFAULT_GROUP, "name", Operator::In, orders_subquery().into()).unwrap();

    let err = compiler().compile(&schema, &tree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSubquery);
}

#[test]
fn test_cycle_is_rejected() {
    let schema = schema();
    let mut tree = FilterTree::new();
    tree.setup_group("self", false, "self").unwrap();

    let err = compiler().compile(&schema, &tree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CompileError);
}
