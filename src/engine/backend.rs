use std::sync::Arc;
use crate::core::config::BackendKind;
use crate::core::error::Result;
use crate::core::types::{Record, Value};
use crate::query::plan::QueryPlan;
use crate::schema::column::{CollectionSchema, ColumnDefinition};
use crate::storage::pool::PoolStats;

/// Storage engine behind the collection facade.
///
/// Plans arrive with their filters unvalidated against the engine; every
/// method compiles first and only then touches storage, so a failed compile
/// never executes anything. `transaction` is `None` outside transactions.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // Catalog
    fn create_collection(&self, schema: CollectionSchema) -> Result<Arc<CollectionSchema>>;
    fn has_collection(&self, name: &str) -> bool;
    fn collection_names(&self) -> Vec<String>;
    fn schema(&self, collection: &str) -> Result<Arc<CollectionSchema>>;
    fn add_column(&self, collection: &str, column: ColumnDefinition) -> Result<Arc<CollectionSchema>>;
    fn remove_column(&self, collection: &str, column: &str) -> Result<Arc<CollectionSchema>>;

    // Data
    fn load(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.iterate(plan, transaction, &mut |record| {
            records.push(record);
            true
        })?;
        Ok(records)
    }

    /// Streams matching records until `callback` returns false.
    /// The callback must not call back into the backend.
    fn iterate(
        &self,
        plan: &QueryPlan<'_>,
        transaction: Option<&str>,
        callback: &mut dyn FnMut(Record) -> bool,
    ) -> Result<()>;

    fn count(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize>;

    fn distinct(&self, plan: &QueryPlan<'_>, column: &str, transaction: Option<&str>) -> Result<Vec<Value>>;

    /// Upsert of a coerced record that already carries its `_id`
    fn save(&self, schema: &CollectionSchema, record: Record, transaction: Option<&str>) -> Result<()>;

    fn delete(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize>;

    // Transactions
    fn begin(&self, name: Option<String>) -> Result<String>;
    fn commit(&self, id: &str) -> Result<()>;
    fn rollback(&self, id: &str) -> Result<()>;
    fn has_transaction(&self, id: &str) -> bool;

    /// Hand-written native query, rows returned without type conversion
    fn raw_query(&self, query: &str, transaction: Option<&str>) -> Result<Vec<Record>>;

    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }

    fn close(&self) -> Result<()>;
}
