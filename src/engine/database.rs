use std::sync::Arc;
use tracing::info;
use crate::collection::collection::Collection;
use crate::core::config::{BackendKind, Config};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Record;
use crate::engine::backend::Backend;
use crate::engine::document_backend::DocumentBackend;
use crate::engine::sql_backend::SqliteBackend;
use crate::schema::column::{CollectionSchema, ColumnDefinition};
use crate::storage::layout::StorageLayout;
use crate::storage::pool::PoolStats;
use crate::storage::sqlite::ConnectionTarget;

/// Entry point: owns one backend and hands out collection facades
pub struct Database {
    config: Config,
    backend: Arc<dyn Backend>,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        let backend: Arc<dyn Backend> = match (config.backend, config.in_memory) {
            (BackendKind::Relational, true) => {
                Arc::new(SqliteBackend::open(ConnectionTarget::memory(), &config)?)
            }
            (BackendKind::Relational, false) => {
                let layout = StorageLayout::new(config.storage_path.clone())?;
                Arc::new(SqliteBackend::open(ConnectionTarget::file(&layout.relational_path), &config)?)
            }
            (BackendKind::Document, true) => Arc::new(DocumentBackend::open(None, &config)?),
            (BackendKind::Document, false) => {
                let layout = StorageLayout::new(config.storage_path.clone())?;
                Arc::new(DocumentBackend::open(Some(&layout.journal_path), &config)?)
            }
        };

        info!(
            backend = ?config.backend,
            in_memory = config.in_memory,
            path = %config.storage_path.display(),
            "database opened"
        );
        Ok(Database { config, backend })
    }

    /// Use an already constructed backend
    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
        Database { config, backend }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn create_collection(&self, name: &str, columns: Vec<ColumnDefinition>) -> Result<Collection> {
        let schema = CollectionSchema::with_columns(name, columns)?;
        self.backend.create_collection(schema)?;
        Ok(Collection::new(name, Arc::clone(&self.backend)))
    }

    pub fn get_collection(&self, name: &str) -> Result<Collection> {
        if !self.backend.has_collection(name) {
            return Err(Error::new(
                ErrorKind::UnknownCollection,
                format!("no collection '{}'", name),
            ));
        }
        Ok(Collection::new(name, Arc::clone(&self.backend)))
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.backend.has_collection(name)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.backend.collection_names()
    }

    pub fn begin_transaction(&self) -> Result<String> {
        self.backend.begin(None)
    }

    pub fn begin_named_transaction(&self, id: &str) -> Result<String> {
        self.backend.begin(Some(id.to_string()))
    }

    pub fn commit_transaction(&self, id: &str) -> Result<()> {
        self.backend.commit(id)
    }

    pub fn rollback_transaction(&self, id: &str) -> Result<()> {
        self.backend.rollback(id)
    }

    pub fn raw_query(&self, query: &str) -> Result<Vec<Record>> {
        self.backend.raw_query(query, None)
    }

    pub fn raw_query_on_transaction(&self, transaction: &str, query: &str) -> Result<Vec<Record>> {
        self.backend.raw_query(query, Some(transaction))
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.backend.pool_stats()
    }

    /// Logs and rolls back transactions that are still open
    pub fn close(&self) -> Result<()> {
        self.backend.close()?;
        info!("database closed");
        Ok(())
    }
}
