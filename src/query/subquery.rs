use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::filter::group::FilterTree;
use crate::query::plan::QueryPlan;
use crate::schema::column::{CollectionSchema, ColumnDefinition};

/// A query used as the right-hand side of `in` / `nin`.
///
/// Owns a snapshot of the inner collection's schema and filters, and projects
/// exactly one column.
#[derive(Debug, Clone)]
pub struct SubQuery {
    pub schema: Arc<CollectionSchema>,
    pub filters: FilterTree,
    columns: Vec<String>,
}

impl SubQuery {
    pub fn new(schema: Arc<CollectionSchema>, filters: FilterTree, columns: Vec<String>) -> Result<Self> {
        if columns.len() != 1 {
            return Err(Error::new(
                ErrorKind::InvalidSubquery,
                format!(
                    "a sub-query on '{}' must project exactly one column, got {}",
                    schema.name,
                    columns.len()
                ),
            ));
        }
        schema.column(&columns[0])?;

        Ok(SubQuery {
            schema,
            filters,
            columns,
        })
    }

    pub fn collection(&self) -> &str {
        &self.schema.name
    }

    pub fn column(&self) -> &str {
        &self.columns[0]
    }

    pub fn column_definition(&self) -> Result<&ColumnDefinition> {
        self.schema.column(self.column())
    }

    pub fn plan(&self) -> QueryPlan<'_> {
        QueryPlan {
            columns: &self.columns,
            ..QueryPlan::filtered(&self.schema, &self.filters)
        }
    }
}
