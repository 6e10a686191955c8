use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use crate::core::config::BackendKind;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Record, RecordId, Value, ID_COLUMN};
use crate::engine::backend::Backend;
use crate::filter::group::{FilterTree, DEFAULT_GROUP};
use crate::filter::operand::{FilterOperand, Operator};
use crate::query::plan::{QueryPlan, SortKey};
use crate::query::subquery::SubQuery;
use crate::schema::coerce::coerce;
use crate::schema::column::{CollectionSchema, ColumnDefinition, ColumnType};

/// Group used by id lookups, next to the static scoping filters
const ID_LOOKUP_GROUP: &str = "_id_lookup";

/// Query/persistence facade over one collection.
///
/// Each instance owns its filter tree, sort keys, projection, window and
/// transaction binding; clones are independent.
#[derive(Clone)]
pub struct Collection {
    name: String,
    backend: Arc<dyn Backend>,
    filters: FilterTree,
    sort: Vec<SortKey>,
    columns: Vec<String>,
    offset: usize,
    limit: usize,
    transaction: Option<String>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("filters", &self.filters)
            .field("sort", &self.sort)
            .field("columns", &self.columns)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub fn new(name: &str, backend: Arc<dyn Backend>) -> Self {
        Collection {
            name: name.to_string(),
            backend,
            filters: FilterTree::new(),
            sort: Vec::new(),
            columns: Vec::new(),
            offset: 0,
            limit: 0,
            transaction: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current column metadata
    pub fn schema(&self) -> Result<Arc<CollectionSchema>> {
        self.backend.schema(&self.name)
    }

    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    // Filters

    pub fn setup_filter_group(&mut self, name: &str, or_sequence: bool, parent: &str) -> Result<()> {
        self.filters.setup_group(name, or_sequence, parent)
    }

    pub fn add_filter(&mut self, column: &str, operator: &str, value: impl Into<FilterOperand>) -> Result<()> {
        self.add_group_filter(DEFAULT_GROUP, column, operator, value)
    }

    pub fn add_group_filter(
        &mut self,
        group: &str,
        column: &str,
        operator: &str,
        value: impl Into<FilterOperand>,
    ) -> Result<()> {
        let schema = self.schema()?;
        let operator = Operator::parse(operator)?;
        self.filters.add_filter(&schema, group, column, operator, value.into())
    }

    pub fn add_static_filter(&mut self, column: &str, operator: &str, value: impl Into<FilterOperand>) -> Result<()> {
        let schema = self.schema()?;
        let operator = Operator::parse(operator)?;
        self.filters.add_static_filter(&schema, column, operator, value.into())
    }

    /// Drop every filter except the static ones
    pub fn clear_filters(&mut self) -> Result<()> {
        self.filters.clear_filters();
        Ok(())
    }

    // Sort, projection, window

    pub fn add_sort(&mut self, column: &str, descending: bool) -> Result<()> {
        self.schema()?.column(column)?;
        self.sort.push(SortKey {
            column: column.to_string(),
            descending,
        });
        Ok(())
    }

    pub fn clear_sort(&mut self) {
        self.sort.clear();
    }

    /// Projection; an empty list selects every column
    pub fn set_result_columns(&mut self, columns: &[&str]) -> Result<()> {
        let schema = self.schema()?;
        for column in columns {
            schema.column(column)?;
        }
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        Ok(())
    }

    /// `limit == 0` means no limit
    pub fn set_limit(&mut self, offset: usize, limit: usize) -> Result<()> {
        self.offset = offset;
        self.limit = limit;
        Ok(())
    }

    // Transactions

    /// Run subsequent operations of this instance inside an open transaction
    pub fn assign_transaction(&mut self, transaction: &str) -> Result<()> {
        if self.backend.kind() == BackendKind::Document {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "the document backend does not support transactions".to_string(),
            ));
        }
        if !self.backend.has_transaction(transaction) {
            return Err(Error::unknown_transaction(transaction));
        }
        self.transaction = Some(transaction.to_string());
        Ok(())
    }

    pub fn clear_transaction(&mut self) {
        self.transaction = None;
    }

    pub fn transaction(&self) -> Option<&str> {
        self.transaction.as_deref()
    }

    /// Plan over the current filters, sort, projection and window
    pub fn plan<'a>(&'a self, schema: &'a CollectionSchema) -> QueryPlan<'a> {
        QueryPlan {
            schema,
            filters: &self.filters,
            sort: &self.sort,
            columns: &self.columns,
            offset: self.offset,
            limit: self.limit,
        }
    }

    // Reads

    pub fn load(&self) -> Result<Vec<Record>> {
        let schema = self.schema()?;
        self.backend.load(&self.plan(&schema), self.transaction())
    }

    /// Record by id; static filters still apply
    pub fn load_by_id(&self, id: &str) -> Result<Record> {
        let schema = self.schema()?;
        let filters = self.id_filters(&schema, id)?;
        let plan = QueryPlan {
            limit: 1,
            columns: &self.columns,
            ..QueryPlan::filtered(&schema, &filters)
        };

        self.backend
            .load(&plan, self.transaction())?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(&self.name, id))
    }

    /// Stream records; stops early when `callback` returns false.
    ///
    /// On the relational backend the callback runs while the connection is
    /// held. It must not issue queries itself: on a single-connection pool, or
    /// inside the same transaction, such a call waits until `acquire_timeout`
    /// and fails. Collect with [`Collection::load`] first when the records
    /// drive further queries.
    pub fn iterate(&self, mut callback: impl FnMut(Record) -> bool) -> Result<()> {
        let schema = self.schema()?;
        self.backend.iterate(&self.plan(&schema), self.transaction(), &mut callback)
    }

    /// Number of matching records; sort and window are ignored
    pub fn count(&self) -> Result<usize> {
        let schema = self.schema()?;
        self.backend
            .count(&QueryPlan::filtered(&schema, &self.filters), self.transaction())
    }

    /// Distinct values of `column` among matching records, ascending
    pub fn distinct(&self, column: &str) -> Result<Vec<Value>> {
        let schema = self.schema()?;
        schema.column(column)?;
        self.backend
            .distinct(&QueryPlan::filtered(&schema, &self.filters), column, self.transaction())
    }

    // Writes

    /// Upsert keyed by `_id`; a fresh id is generated when it is missing
    pub fn save(&self, record: Record) -> Result<RecordId> {
        let schema = self.schema()?;

        let mut coerced = Record::new();
        for (column, value) in record.fields {
            let definition = schema.column(&column)?;
            coerced.set(column, coerce(value, &definition.column_type)?);
        }

        let id = match coerced.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().simple().to_string(),
        };
        coerced.set_id(&id);

        self.backend.save(&schema, coerced, self.transaction())?;
        Ok(id)
    }

    /// Delete matching records; sort and window are ignored
    pub fn delete(&self) -> Result<usize> {
        let schema = self.schema()?;
        self.backend
            .delete(&QueryPlan::filtered(&schema, &self.filters), self.transaction())
    }

    pub fn delete_by_id(&self, id: &str) -> Result<()> {
        let schema = self.schema()?;
        let filters = self.id_filters(&schema, id)?;
        match self
            .backend
            .delete(&QueryPlan::filtered(&schema, &filters), self.transaction())?
        {
            0 => Err(not_found(&self.name, id)),
            _ => Ok(()),
        }
    }

    // Columns

    pub fn list_columns(&self) -> Result<BTreeMap<String, ColumnType>> {
        Ok(self.schema()?.list_columns())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema().map_or(false, |schema| schema.has_column(name))
    }

    pub fn add_column(&self, column: ColumnDefinition) -> Result<()> {
        self.backend.add_column(&self.name, column)?;
        Ok(())
    }

    pub fn remove_column(&self, name: &str) -> Result<()> {
        self.backend.remove_column(&self.name, name)?;
        Ok(())
    }

    /// This collection's filters projected on its single result column,
    /// for use as the operand of `in`/`nin` on another collection
    pub fn subquery(&self) -> Result<SubQuery> {
        SubQuery::new(self.schema()?, self.filters.clone(), self.columns.clone())
    }

    fn id_filters(&self, schema: &CollectionSchema, id: &str) -> Result<FilterTree> {
        let mut filters = self.filters.static_only();
        filters.add_filter(schema, ID_LOOKUP_GROUP, ID_COLUMN, Operator::Eq, id.into())?;
        Ok(filters)
    }
}

fn not_found(collection: &str, id: &str) -> Error {
    Error::new(
        ErrorKind::NotFound,
        format!("no record '{}' in '{}'", id, collection),
    )
}
