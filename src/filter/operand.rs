use std::fmt;
use chrono::{DateTime, Utc};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::query::subquery::SubQuery;

/// Generic comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    Nin,
}

impl Operator {
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim().to_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "like" => Ok(Operator::Like),
            "in" => Ok(Operator::In),
            "nin" | "not in" => Ok(Operator::Nin),
            other => Err(Error::new(
                ErrorKind::UnsupportedOperator,
                format!("unsupported operator '{}'", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Nin => "nin",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a filter: a literal (or literal list) or a nested query
#[derive(Debug, Clone)]
pub enum FilterOperand {
    Value(Value),
    Subquery(Box<SubQuery>),
}

impl From<SubQuery> for FilterOperand {
    fn from(subquery: SubQuery) -> Self {
        FilterOperand::Subquery(Box::new(subquery))
    }
}

macro_rules! operand_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterOperand {
                fn from(value: $ty) -> Self {
                    FilterOperand::Value(Value::from(value))
                }
            }
        )*
    };
}

operand_from!(Value, bool, i64, f64, &str, String, DateTime<Utc>, serde_json::Value, Vec<Value>);

impl From<Vec<&str>> for FilterOperand {
    fn from(items: Vec<&str>) -> Self {
        FilterOperand::Value(Value::Array(items.into_iter().map(Value::from).collect()))
    }
}

impl From<Vec<i64>> for FilterOperand {
    fn from(items: Vec<i64>) -> Self {
        FilterOperand::Value(Value::Array(items.into_iter().map(Value::from).collect()))
    }
}
