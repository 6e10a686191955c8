use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use crate::core::config::{BackendKind, Config};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Record, Value};
use crate::engine::backend::Backend;
use crate::query::compiler::QueryCompiler;
use crate::query::document::{DocumentCompiler, SubqueryResolver};
use crate::query::plan::QueryPlan;
use crate::query::subquery::SubQuery;
use crate::query::translate::OperatorTranslator;
use crate::schema::column::{validate_collection_name, CollectionSchema, ColumnDefinition};
use crate::storage::document_store::{from_document_value, json_to_value, to_document_value, DocumentStore, FindOptions, JsonMap};
use crate::storage::journal::{Journal, JournalOp};
use crate::storage::matcher::DocumentFilter;

/// Embedded document backend with an optional write-ahead journal
pub struct DocumentBackend {
    schemas: RwLock<HashMap<String, Arc<CollectionSchema>>>,
    store: RwLock<DocumentStore>,
    journal: Option<Mutex<Journal>>,
    translator: OperatorTranslator,
}

impl DocumentBackend {
    /// Open on a journal file, replaying it; `None` keeps everything in memory
    pub fn open(journal_path: Option<&Path>, config: &Config) -> Result<Self> {
        let backend = DocumentBackend {
            schemas: RwLock::new(HashMap::new()),
            store: RwLock::new(DocumentStore::new()),
            journal: None,
            translator: OperatorTranslator::new(config.like_falls_back_to_equal),
        };

        let path = match journal_path {
            Some(path) => path,
            None => {
                info!("document backend opened in memory");
                return Ok(backend);
            }
        };

        let (journal, entries) = Journal::open(path, config.journal_sync)?;
        {
            let mut schemas = backend.schemas.write();
            let mut store = backend.store.write();
            for entry in &entries {
                apply(&mut schemas, &mut store, &entry.operation)?;
            }
        }

        info!(
            path = %path.display(),
            entries = entries.len(),
            collections = backend.schemas.read().len(),
            "document backend opened"
        );
        Ok(DocumentBackend {
            journal: Some(Mutex::new(journal)),
            ..backend
        })
    }

    /// Compile a plan's filters, resolving sub-queries against current data
    pub fn compile_selector(&self, plan: &QueryPlan<'_>) -> Result<JsonValue> {
        let selector = DocumentCompiler::new(self.translator.clone())
            .with_resolver(self)
            .compile(plan.schema, plan.filters)?;
        debug!(collection = %plan.collection(), selector = %selector, "compiled selector");
        Ok(selector)
    }

    /// Run a plan with an already compiled selector
    pub fn find_with_selector(&self, plan: &QueryPlan<'_>, selector: &JsonValue) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.scan(plan, selector, &mut |record| {
            records.push(record);
            true
        })?;
        Ok(records)
    }

    fn scan(
        &self,
        plan: &QueryPlan<'_>,
        selector: &JsonValue,
        callback: &mut dyn FnMut(Record) -> bool,
    ) -> Result<()> {
        let filter = DocumentFilter::parse(selector)?;
        let columns = plan.result_columns();
        for column in &columns {
            plan.schema.column(column)?;
        }
        for key in plan.sort {
            plan.schema.column(&key.column)?;
        }

        let documents = self.store.read().find(
            plan.collection(),
            &filter,
            &FindOptions {
                sort: plan.sort,
                skip: plan.offset,
                limit: plan.limit,
                projection: plan.columns,
            },
        )?;

        for document in documents {
            if !callback(to_record(plan.schema, &columns, &document)?) {
                break;
            }
        }
        Ok(())
    }

    /// Journal first, then apply to memory, under the same locks
    fn commit_op(&self, op: JournalOp) -> Result<()> {
        let mut schemas = self.schemas.write();
        let mut store = self.store.write();
        if let Some(journal) = &self.journal {
            journal.lock().append(op.clone())?;
        }
        apply(&mut schemas, &mut store, &op)
    }
}

impl SubqueryResolver for DocumentBackend {
    fn resolve(&self, subquery: &SubQuery) -> Result<Vec<Value>> {
        let values = self.distinct(&subquery.plan(), subquery.column(), None)?;
        debug!(
            collection = %subquery.collection(),
            column = %subquery.column(),
            values = values.len(),
            "sub-query resolved"
        );
        Ok(values)
    }
}

impl Backend for DocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn create_collection(&self, schema: CollectionSchema) -> Result<Arc<CollectionSchema>> {
        validate_collection_name(&schema.name)?;
        if self.has_collection(&schema.name) {
            return Err(Error::new(
                ErrorKind::CollectionAlreadyExists,
                format!("collection '{}' already exists", schema.name),
            ));
        }
        let name = schema.name.clone();
        self.commit_op(JournalOp::CreateCollection(schema))?;
        self.schema(&name)
    }

    fn has_collection(&self, name: &str) -> bool {
        self.schemas.read().contains_key(name)
    }

    fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn schema(&self, collection: &str) -> Result<Arc<CollectionSchema>> {
        self.schemas
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| unknown_collection(collection))
    }

    fn add_column(&self, collection: &str, column: ColumnDefinition) -> Result<Arc<CollectionSchema>> {
        // Validate before journaling
        (*self.schema(collection)?).clone().add_column(column.clone())?;
        self.commit_op(JournalOp::AddColumn {
            collection: collection.to_string(),
            column,
        })?;
        self.schema(collection)
    }

    fn remove_column(&self, collection: &str, column: &str) -> Result<Arc<CollectionSchema>> {
        (*self.schema(collection)?).clone().remove_column(column)?;
        self.commit_op(JournalOp::RemoveColumn {
            collection: collection.to_string(),
            column: column.to_string(),
        })?;
        self.schema(collection)
    }

    fn iterate(
        &self,
        plan: &QueryPlan<'_>,
        transaction: Option<&str>,
        callback: &mut dyn FnMut(Record) -> bool,
    ) -> Result<()> {
        reject_transaction(transaction)?;
        let selector = self.compile_selector(plan)?;
        self.scan(plan, &selector, callback)
    }

    fn count(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize> {
        reject_transaction(transaction)?;
        let filter = DocumentFilter::parse(&self.compile_selector(plan)?)?;
        self.store.read().count(plan.collection(), &filter)
    }

    fn distinct(&self, plan: &QueryPlan<'_>, column: &str, transaction: Option<&str>) -> Result<Vec<Value>> {
        reject_transaction(transaction)?;
        let column_type = plan.schema.column(column)?.column_type.clone();
        let filter = DocumentFilter::parse(&self.compile_selector(plan)?)?;

        self.store
            .read()
            .distinct(plan.collection(), column, &filter)?
            .iter()
            .map(|value| from_document_value(value, &column_type))
            .collect()
    }

    fn save(&self, schema: &CollectionSchema, record: Record, transaction: Option<&str>) -> Result<()> {
        reject_transaction(transaction)?;
        let id = record
            .id()
            .map(str::to_string)
            .ok_or_else(|| Error::new(ErrorKind::Internal, "record reached storage without an id".to_string()))?;

        let mut fields = JsonMap::new();
        for (name, value) in &record.fields {
            schema.column(name)?;
            fields.insert(name.clone(), to_document_value(value));
        }

        self.commit_op(JournalOp::Upsert {
            collection: schema.name.clone(),
            id,
            fields,
        })
    }

    fn delete(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize> {
        reject_transaction(transaction)?;
        let filter = DocumentFilter::parse(&self.compile_selector(plan)?)?;

        let mut schemas = self.schemas.write();
        let mut store = self.store.write();
        let ids = store.matching_ids(plan.collection(), &filter)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let op = JournalOp::Delete {
            collection: plan.collection().to_string(),
            ids: ids.clone(),
        };
        if let Some(journal) = &self.journal {
            journal.lock().append(op.clone())?;
        }
        apply(&mut schemas, &mut store, &op)?;
        Ok(ids.len())
    }

    fn begin(&self, _name: Option<String>) -> Result<String> {
        Err(no_transactions())
    }

    fn commit(&self, _id: &str) -> Result<()> {
        Err(no_transactions())
    }

    fn rollback(&self, _id: &str) -> Result<()> {
        Err(no_transactions())
    }

    fn has_transaction(&self, _id: &str) -> bool {
        false
    }

    /// Accepts `{"find": "<collection>", "filter": {...}, "limit": n}`
    fn raw_query(&self, query: &str, transaction: Option<&str>) -> Result<Vec<Record>> {
        reject_transaction(transaction)?;
        let command: JsonValue = serde_json::from_str(query)?;
        let collection = command.get("find").and_then(JsonValue::as_str).ok_or_else(|| {
            Error::new(
                ErrorKind::Unsupported,
                "raw document queries must be {\"find\": \"<collection>\", \"filter\": {...}}".to_string(),
            )
        })?;
        let filter = match command.get("filter") {
            Some(selector) => DocumentFilter::parse(selector)?,
            None => DocumentFilter::MatchAll,
        };
        let limit = command.get("limit").and_then(JsonValue::as_u64).unwrap_or(0) as usize;

        debug!(collection = %collection, "raw query");
        let documents = self.store.read().find(
            collection,
            &filter,
            &FindOptions {
                limit,
                ..FindOptions::default()
            },
        )?;

        Ok(documents
            .iter()
            .map(|document| Record {
                fields: document
                    .iter()
                    .map(|(name, value)| (name.clone(), json_to_value(value)))
                    .collect(),
            })
            .collect())
    }

    fn close(&self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().sync()?;
        }
        info!(collections = self.schemas.read().len(), "document backend closed");
        Ok(())
    }
}

fn apply(
    schemas: &mut HashMap<String, Arc<CollectionSchema>>,
    store: &mut DocumentStore,
    op: &JournalOp,
) -> Result<()> {
    match op {
        JournalOp::CreateCollection(schema) => {
            store.create_collection(&schema.name);
            schemas.insert(schema.name.clone(), Arc::new(schema.clone()));
        }
        JournalOp::AddColumn { collection, column } => {
            let schema = schemas
                .get_mut(collection)
                .ok_or_else(|| unknown_collection(collection))?;
            Arc::make_mut(schema).add_column(column.clone())?;
        }
        JournalOp::RemoveColumn { collection, column } => {
            let schema = schemas
                .get_mut(collection)
                .ok_or_else(|| unknown_collection(collection))?;
            Arc::make_mut(schema).remove_column(column)?;
            store.remove_field(collection, column)?;
        }
        JournalOp::Upsert { collection, id, fields } => {
            store.upsert(collection, id, fields.clone())?;
        }
        JournalOp::Delete { collection, ids } => {
            store.delete(collection, ids)?;
        }
    }
    Ok(())
}

fn to_record(schema: &CollectionSchema, columns: &[&str], document: &JsonMap) -> Result<Record> {
    let mut record = Record::new();
    for &name in columns {
        let value = match document.get(name) {
            Some(value) => from_document_value(value, &schema.column(name)?.column_type)?,
            None => Value::Null,
        };
        record.set(name.to_string(), value);
    }
    Ok(record)
}

fn reject_transaction(transaction: Option<&str>) -> Result<()> {
    match transaction {
        Some(_) => Err(no_transactions()),
        None => Ok(()),
    }
}

fn no_transactions() -> Error {
    Error::new(
        ErrorKind::Unsupported,
        "the document backend does not support transactions".to_string(),
    )
}

fn unknown_collection(name: &str) -> Error {
    Error::new(ErrorKind::UnknownCollection, format!("no collection '{}'", name))
}
