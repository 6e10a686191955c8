use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::filter::group::FilterValue;
use crate::filter::operand::{FilterOperand, Operator};
use crate::query::subquery::SubQuery;
use crate::schema::coerce::coerce_operand;
use crate::schema::column::{CollectionSchema, ColumnDefinition};

/// Scalar comparison after translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    pub fn document(&self) -> &'static str {
        match self {
            Comparison::Eq => "$eq",
            Comparison::Ne => "$ne",
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
        }
    }
}

/// Backend-neutral predicate with values already coerced to the column type
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        column: String,
        op: Comparison,
        value: Value,
    },
    Like {
        column: String,
        pattern: String,
    },
    InList {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `in`/`nin` against an array column: one "contains" check per element
    ArrayContains {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    InSubquery {
        column: ColumnDefinition,
        subquery: SubQuery,
        negated: bool,
    },
}

/// Turns `(column, operator, value)` into a [`Predicate`]
#[derive(Debug, Clone, Default)]
pub struct OperatorTranslator {
    /// Downgrade `like` on numeric/boolean columns to `=` instead of failing
    pub like_falls_back_to_equal: bool,
}

impl OperatorTranslator {
    pub fn new(like_falls_back_to_equal: bool) -> Self {
        OperatorTranslator {
            like_falls_back_to_equal,
        }
    }

    pub fn translate(&self, schema: &CollectionSchema, filter: &FilterValue) -> Result<Predicate> {
        let column = schema.column(&filter.column)?;

        match filter.operator {
            Operator::In | Operator::Nin => {
                self.translate_membership(column, &filter.value, filter.operator == Operator::Nin)
            }
            operator => {
                let value = match &filter.value {
                    FilterOperand::Value(value) => value.clone(),
                    FilterOperand::Subquery(_) => {
                        return Err(Error::new(
                            ErrorKind::InvalidSubquery,
                            format!(
                                "sub-queries are only valid with in/nin, not '{}' on '{}'",
                                operator, column.name
                            ),
                        ))
                    }
                };

                match operator {
                    Operator::Like => self.translate_like(column, value),
                    Operator::Eq => compare(column, Comparison::Eq, value),
                    Operator::Ne => compare(column, Comparison::Ne, value),
                    Operator::Gt => compare(column, Comparison::Gt, value),
                    Operator::Gte => compare(column, Comparison::Gte, value),
                    Operator::Lt => compare(column, Comparison::Lt, value),
                    Operator::Lte => compare(column, Comparison::Lte, value),
                    Operator::In | Operator::Nin => unreachable!("membership handled above"),
                }
            }
        }
    }

    fn translate_membership(
        &self,
        column: &ColumnDefinition,
        operand: &FilterOperand,
        negated: bool,
    ) -> Result<Predicate> {
        let value = match operand {
            FilterOperand::Subquery(subquery) => {
                subquery.column_definition()?;
                return Ok(Predicate::InSubquery {
                    column: column.clone(),
                    subquery: (**subquery).clone(),
                    negated,
                });
            }
            FilterOperand::Value(value) => value.clone(),
        };

        let items = match value {
            Value::Array(items) => items,
            Value::Json(serde_json::Value::Array(items)) => items.into_iter().map(Value::Json).collect(),
            Value::Null => Vec::new(),
            scalar => vec![scalar],
        };

        let element_type = column.column_type.element_type();
        let values = items
            .into_iter()
            .map(|item| coerce_operand(item, element_type))
            .collect::<Result<Vec<_>>>()?;

        if column.column_type.is_array() {
            Ok(Predicate::ArrayContains {
                column: column.name.clone(),
                values,
                negated,
            })
        } else {
            Ok(Predicate::InList {
                column: column.name.clone(),
                values,
                negated,
            })
        }
    }

    fn translate_like(&self, column: &ColumnDefinition, value: Value) -> Result<Predicate> {
        let column_type = &column.column_type;

        if column_type.is_numeric() || column_type.is_boolean() {
            if self.like_falls_back_to_equal {
                return compare(column, Comparison::Eq, value);
            }
            return Err(Error::new(
                ErrorKind::InvalidOperatorForType,
                format!("'like' is not valid for {} column '{}'", column_type, column.name),
            ));
        }

        let text = value.to_text();
        let pattern = if text.contains('%') {
            text
        } else {
            format!("%{}%", escape_like(&text))
        };

        Ok(Predicate::Like {
            column: column.name.clone(),
            pattern,
        })
    }
}

/// Escape `\`, `%` and `_` so the text matches literally under `ESCAPE '\'`
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn compare(column: &ColumnDefinition, op: Comparison, value: Value) -> Result<Predicate> {
    if !matches!(op, Comparison::Eq | Comparison::Ne) {
        if !column.column_type.is_orderable() {
            return Err(Error::new(
                ErrorKind::InvalidOperatorForType,
                format!(
                    "'{}' is not valid for {} column '{}'",
                    op.sql(),
                    column.column_type,
                    column.name
                ),
            ));
        }
        if value.is_null() {
            return Err(Error::new(
                ErrorKind::InvalidOperatorForType,
                format!("cannot order column '{}' against null", column.name),
            ));
        }
    }

    Ok(Predicate::Compare {
        column: column.name.clone(),
        op,
        value: coerce_operand(value, &column.column_type)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ColumnType;

    fn schema() -> CollectionSchema {
        CollectionSchema::with_columns(
            "items",
            vec![
                ColumnDefinition::new("qty", ColumnType::Integer),
                ColumnDefinition::new("name", ColumnType::Text),
                ColumnDefinition::new("tags", ColumnType::Array(Box::new(ColumnType::Text))),
            ],
        )
        .unwrap()
    }

    fn filter(column: &str, operator: Operator, value: impl Into<FilterOperand>) -> FilterValue {
        FilterValue {
            column: column.to_string(),
            operator,
            value: value.into(),
        }
    }

    #[test]
    fn coerces_before_comparing() {
        let predicate = OperatorTranslator::default()
            .translate(&schema(), &filter("qty", Operator::Gt, "10"))
            .unwrap();
        match predicate {
            Predicate::Compare { op, value, .. } => {
                assert_eq!(op, Comparison::Gt);
                assert_eq!(value, Value::Integer(10));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn like_wraps_plain_text() {
        let predicate = OperatorTranslator::default()
            .translate(&schema(), &filter("name", Operator::Like, "bolt"))
            .unwrap();
        assert!(matches!(predicate, Predicate::Like { ref pattern, .. } if pattern == "%bolt%"));

        let predicate = OperatorTranslator::default()
            .translate(&schema(), &filter("name", Operator::Like, "bo%"))
            .unwrap();
        assert!(matches!(predicate, Predicate::Like { ref pattern, .. } if pattern == "bo%"));
    }

    #[test]
    fn like_on_numbers_is_rejected_unless_configured() {
        let err = OperatorTranslator::default()
            .translate(&schema(), &filter("qty", Operator::Like, "5"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOperatorForType);

        let predicate = OperatorTranslator::new(true)
            .translate(&schema(), &filter("qty", Operator::Like, "5"))
            .unwrap();
        assert!(matches!(predicate, Predicate::Compare { op: Comparison::Eq, value: Value::Integer(5), .. }));
    }

    #[test]
    fn membership_on_array_columns_expands() {
        let predicate = OperatorTranslator::default()
            .translate(&schema(), &filter("tags", Operator::Nin, vec!["a", "b"]))
            .unwrap();
        match predicate {
            Predicate::ArrayContains { values, negated, .. } => {
                assert!(negated);
                assert_eq!(values, vec![Value::from("a"), Value::from("b")]);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn ordering_arrays_is_rejected() {
        let err = OperatorTranslator::default()
            .translate(&schema(), &filter("tags", Operator::Gt, "a"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOperatorForType);
    }
}
