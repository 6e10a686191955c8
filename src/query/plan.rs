use serde::{Serialize, Deserialize};
use crate::filter::group::FilterTree;
use crate::schema::column::CollectionSchema;

/// Sort key for query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// Everything a backend needs to run one collection query
#[derive(Debug, Clone, Copy)]
pub struct QueryPlan<'a> {
    pub schema: &'a CollectionSchema,
    pub filters: &'a FilterTree,
    pub sort: &'a [SortKey],
    pub columns: &'a [String],  // empty = all columns
    pub offset: usize,
    pub limit: usize,           // 0 = unlimited
}

impl<'a> QueryPlan<'a> {
    /// Unsorted, unlimited plan over every column
    pub fn filtered(schema: &'a CollectionSchema, filters: &'a FilterTree) -> Self {
        QueryPlan {
            schema,
            filters,
            sort: &[],
            columns: &[],
            offset: 0,
            limit: 0,
        }
    }

    pub fn collection(&self) -> &str {
        &self.schema.name
    }

    /// Projected column names, all schema columns when no projection is set
    pub fn result_columns(&self) -> Vec<&str> {
        if self.columns.is_empty() {
            self.schema.columns.keys().map(String::as_str).collect()
        } else {
            self.columns.iter().map(String::as_str).collect()
        }
    }
}
