use serde_json::{json, Value as JsonValue};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::query::compiler::QueryCompiler;
use crate::query::subquery::SubQuery;
use crate::query::translate::{OperatorTranslator, Predicate};
use crate::schema::coerce::{coerce_operand, plain_json};

/// Evaluates a sub-query to the distinct values of its single column
pub trait SubqueryResolver {
    fn resolve(&self, subquery: &SubQuery) -> Result<Vec<Value>>;
}

/// Renders filter trees as Mongo-style query documents.
///
/// Sub-queries are resolved while compiling: the outer query sees the
/// inner result set as it was at that moment, not at execution time.
pub struct DocumentCompiler<'r> {
    translator: OperatorTranslator,
    resolver: Option<&'r dyn SubqueryResolver>,
}

impl<'r> DocumentCompiler<'r> {
    pub fn new(translator: OperatorTranslator) -> Self {
        DocumentCompiler {
            translator,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'r dyn SubqueryResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl QueryCompiler for DocumentCompiler<'_> {
    type Selector = JsonValue;

    fn translator(&self) -> &OperatorTranslator {
        &self.translator
    }

    fn predicate(&mut self, predicate: Predicate) -> Result<JsonValue> {
        match predicate {
            Predicate::Compare { column, op, value } => {
                Ok(json!({ column: { op.document(): plain_json(&value) } }))
            }

            Predicate::Like { column, pattern } => Ok(json!({
                column: { "$regex": like_to_regex(&pattern), "$options": "is" }
            })),

            Predicate::InList { column, values, negated } => {
                let values: Vec<JsonValue> = values.iter().map(plain_json).collect();
                let op = if negated { "$nin" } else { "$in" };
                Ok(json!({ column: { op: values } }))
            }

            Predicate::ArrayContains { column, values, negated } => {
                let terms: Vec<JsonValue> = values
                    .iter()
                    .map(|value| json!({ column.as_str(): { "$eq": plain_json(value) } }))
                    .collect();
                let op = if negated { "$nor" } else { "$or" };
                Ok(json!({ op: terms }))
            }

            Predicate::InSubquery { column, subquery, negated } => {
                let resolver = self.resolver.ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidSubquery,
                        format!("no resolver for the sub-query on '{}'", subquery.collection()),
                    )
                })?;

                let element_type = column.column_type.element_type();
                let values = resolver
                    .resolve(&subquery)?
                    .into_iter()
                    .map(|value| coerce_operand(value, element_type))
                    .collect::<Result<Vec<_>>>()?;

                let resolved = if column.column_type.is_array() {
                    Predicate::ArrayContains {
                        column: column.name,
                        values,
                        negated,
                    }
                } else {
                    Predicate::InList {
                        column: column.name,
                        values,
                        negated,
                    }
                };
                self.predicate(resolved)
            }
        }
    }

    fn join(&self, terms: Vec<JsonValue>, or_sequence: bool) -> JsonValue {
        let op = if or_sequence { "$or" } else { "$and" };
        json!({ op: terms })
    }

    fn match_all(&self) -> JsonValue {
        json!({})
    }
}

/// SQL `LIKE` pattern (escape character `\`) to an anchored regular expression
pub fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            '%' | '_' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if c == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    regex.push_str(&regex::escape(&literal));
    regex.push('$');
    regex
}
