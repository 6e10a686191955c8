use rusqlite::types::Value as SqlValue;
use crate::core::error::Result;
use crate::query::compiler::QueryCompiler;
use crate::query::plan::QueryPlan;
use crate::query::translate::{escape_like, Comparison, OperatorTranslator, Predicate};
use crate::storage::sqlite::{array_element, quote_identifier, to_sql_value};

/// SQL text plus its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn bound(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Renders filter trees as SQLite `WHERE` expressions with bound parameters
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    translator: OperatorTranslator,
}

impl SqlCompiler {
    pub fn new(translator: OperatorTranslator) -> Self {
        SqlCompiler { translator }
    }

    /// Compiled `WHERE` expression, empty when the tree matches everything
    pub fn where_clause(&mut self, plan: &QueryPlan<'_>) -> Result<SqlFragment> {
        self.compile(plan.schema, plan.filters)
    }

    pub fn select(&mut self, plan: &QueryPlan<'_>) -> Result<SqlFragment> {
        let mut columns = Vec::new();
        for column in plan.result_columns() {
            plan.schema.column(column)?;
            columns.push(quote_identifier(column));
        }

        let mut statement = SqlFragment::new(format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_identifier(plan.collection())
        ));
        self.append_where(&mut statement, plan)?;

        if !plan.sort.is_empty() {
            let mut keys = Vec::with_capacity(plan.sort.len());
            for key in plan.sort {
                plan.schema.column(&key.column)?;
                keys.push(format!(
                    "{} {}",
                    quote_identifier(&key.column),
                    if key.descending { "DESC" } else { "ASC" }
                ));
            }
            statement.sql.push_str(" ORDER BY ");
            statement.sql.push_str(&keys.join(", "));
        }

        match (plan.limit, plan.offset) {
            (0, 0) => {}
            (0, offset) => statement.sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (limit, 0) => statement.sql.push_str(&format!(" LIMIT {}", limit)),
            (limit, offset) => statement.sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        }

        Ok(statement)
    }

    pub fn count(&mut self, plan: &QueryPlan<'_>) -> Result<SqlFragment> {
        let mut statement = SqlFragment::new(format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(plan.collection())
        ));
        self.append_where(&mut statement, plan)?;
        Ok(statement)
    }

    pub fn distinct(&mut self, plan: &QueryPlan<'_>, column: &str) -> Result<SqlFragment> {
        plan.schema.column(column)?;
        let column = quote_identifier(column);

        let mut statement = SqlFragment::new(format!(
            "SELECT DISTINCT {} FROM {}",
            column,
            quote_identifier(plan.collection())
        ));
        self.append_where(&mut statement, plan)?;
        statement.sql.push_str(&format!(" ORDER BY {} ASC", column));
        Ok(statement)
    }

    pub fn delete(&mut self, plan: &QueryPlan<'_>) -> Result<SqlFragment> {
        let mut statement = SqlFragment::new(format!(
            "DELETE FROM {}",
            quote_identifier(plan.collection())
        ));
        self.append_where(&mut statement, plan)?;
        Ok(statement)
    }

    fn append_where(&mut self, statement: &mut SqlFragment, plan: &QueryPlan<'_>) -> Result<()> {
        let condition = self.where_clause(plan)?;
        if !condition.is_empty() {
            statement.sql.push_str(" WHERE ");
            statement.sql.push_str(&condition.sql);
            statement.params.extend(condition.params);
        }
        Ok(())
    }
}

impl QueryCompiler for SqlCompiler {
    type Selector = SqlFragment;

    fn translator(&self) -> &OperatorTranslator {
        &self.translator
    }

    fn predicate(&mut self, predicate: Predicate) -> Result<SqlFragment> {
        match predicate {
            Predicate::Compare { column, op, value } => {
                let column = quote_identifier(&column);
                if value.is_null() {
                    let test = if op == Comparison::Ne { "IS NOT NULL" } else { "IS NULL" };
                    return Ok(SqlFragment::new(format!("{} {}", column, test)));
                }
                Ok(SqlFragment::bound(
                    format!("{} {} ?", column, op.sql()),
                    vec![to_sql_value(&value)?],
                ))
            }

            Predicate::Like { column, pattern } => Ok(SqlFragment::bound(
                format!("{} LIKE ? ESCAPE '\\'", quote_identifier(&column)),
                vec![SqlValue::Text(pattern)],
            )),

            Predicate::InList { column, values, negated } => {
                if values.is_empty() {
                    return Ok(SqlFragment::new(if negated { "1" } else { "0" }));
                }
                let params = values.iter().map(to_sql_value).collect::<Result<Vec<_>>>()?;
                let placeholders = vec!["?"; params.len()].join(", ");
                Ok(SqlFragment::bound(
                    format!(
                        "{} {}IN ({})",
                        quote_identifier(&column),
                        if negated { "NOT " } else { "" },
                        placeholders
                    ),
                    params,
                ))
            }

            Predicate::ArrayContains { column, values, negated } => {
                if values.is_empty() {
                    return Ok(SqlFragment::new(if negated { "1" } else { "0" }));
                }
                let column = quote_identifier(&column);
                let mut terms = Vec::with_capacity(values.len());
                for value in &values {
                    let element = escape_like(&array_element(value)?);
                    terms.push(SqlFragment::bound(
                        format!("{} LIKE ? ESCAPE '\\'", column),
                        vec![SqlValue::Text(format!("%,{},%", element))],
                    ));
                }
                let contains = self.collapse(terms, true).unwrap_or_default();
                if negated {
                    Ok(SqlFragment::bound(format!("NOT ({})", contains.sql), contains.params))
                } else {
                    Ok(contains)
                }
            }

            Predicate::InSubquery { column, subquery, negated } => {
                // Compiled now and executed by the engine together with the outer query
                let inner = SqlCompiler::new(self.translator.clone()).select(&subquery.plan())?;
                Ok(SqlFragment::bound(
                    format!(
                        "{} {}IN ({})",
                        quote_identifier(&column.name),
                        if negated { "NOT " } else { "" },
                        inner.sql
                    ),
                    inner.params,
                ))
            }
        }
    }

    fn join(&self, terms: Vec<SqlFragment>, or_sequence: bool) -> SqlFragment {
        let separator = if or_sequence { " OR " } else { " AND " };
        let mut sql = Vec::with_capacity(terms.len());
        let mut params = Vec::new();
        for term in terms {
            sql.push(term.sql);
            params.extend(term.params);
        }
        SqlFragment::bound(format!("({})", sql.join(separator)), params)
    }

    fn match_all(&self) -> SqlFragment {
        SqlFragment::default()
    }
}

