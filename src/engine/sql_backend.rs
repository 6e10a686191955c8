use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, info};
use crate::core::config::{BackendKind, Config};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Record, Value, ID_COLUMN};
use crate::engine::backend::Backend;
use crate::query::plan::QueryPlan;
use crate::query::sql::{SqlCompiler, SqlFragment};
use crate::query::translate::OperatorTranslator;
use crate::schema::column::{validate_collection_name, CollectionSchema, ColumnDefinition, ColumnType};
use crate::storage::pool::{ConnectionPool, PoolConfig, PoolStats};
use crate::storage::sqlite::{from_sql_value, open_connection, quote_identifier, to_sql_value, untyped, ConnectionTarget};

/// Catalog table holding column metadata of every collection
const CATALOG_TABLE: &str = "_columns";

/// SQLite backend: one table per collection plus the column catalog
pub struct SqliteBackend {
    pool: ConnectionPool,
    schemas: RwLock<HashMap<String, Arc<CollectionSchema>>>,
    translator: OperatorTranslator,
}

impl SqliteBackend {
    pub fn open(target: ConnectionTarget, config: &Config) -> Result<Self> {
        let busy_timeout = config.busy_timeout();
        let opener_target = target.clone();
        let pool = ConnectionPool::new(
            PoolConfig {
                max_connections: config.max_connections,
                acquire_timeout: config.acquire_timeout(),
                execute_timeout: config.execute_timeout(),
            },
            move || open_connection(&opener_target, busy_timeout),
        );

        let backend = SqliteBackend {
            pool,
            schemas: RwLock::new(HashMap::new()),
            translator: OperatorTranslator::new(config.like_falls_back_to_equal),
        };
        backend.load_catalog()?;

        info!(
            location = ?target,
            collections = backend.schemas.read().len(),
            max_connections = backend.pool.config().max_connections,
            "relational backend opened"
        );
        Ok(backend)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.translator.clone())
    }

    fn load_catalog(&self) -> Result<()> {
        let rows = self.pool.with_connection(None, |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    collection TEXT NOT NULL,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL,
                    indexed INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (collection, name)
                )",
                quote_identifier(CATALOG_TABLE)
            ))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT collection, name, type, indexed FROM {} ORDER BY collection, name",
                quote_identifier(CATALOG_TABLE)
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut schemas: HashMap<String, CollectionSchema> = HashMap::new();
        for (collection, name, type_name, indexed) in rows {
            let schema = schemas
                .entry(collection.clone())
                .or_insert_with(|| CollectionSchema::new(&collection));
            if name == ID_COLUMN {
                continue;
            }
            let mut column = ColumnDefinition::new(&name, ColumnType::parse(&type_name)?);
            column.indexed = indexed;
            schema.add_column(column)?;
        }

        *self.schemas.write() = schemas
            .into_iter()
            .map(|(name, schema)| (name, Arc::new(schema)))
            .collect();
        Ok(())
    }

    fn execute(&self, statement: &SqlFragment, transaction: Option<&str>) -> Result<usize> {
        debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        self.pool.with_connection(transaction, |conn| {
            Ok(conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?)
        })
    }

    fn replace_schema(&self, schema: CollectionSchema) -> Arc<CollectionSchema> {
        let schema = Arc::new(schema);
        self.schemas.write().insert(schema.name.clone(), Arc::clone(&schema));
        schema
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn create_collection(&self, schema: CollectionSchema) -> Result<Arc<CollectionSchema>> {
        validate_collection_name(&schema.name)?;
        if self.has_collection(&schema.name) {
            return Err(collection_exists(&schema.name));
        }

        let table = quote_identifier(&schema.name);
        let columns: Vec<String> = schema
            .columns
            .values()
            .map(|column| {
                if column.name == ID_COLUMN {
                    format!("{} TEXT PRIMARY KEY", quote_identifier(ID_COLUMN))
                } else {
                    format!("{} {}", quote_identifier(&column.name), column.column_type.sql_type())
                }
            })
            .collect();

        self.pool.with_connection(None, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&format!("CREATE TABLE {} ({})", table, columns.join(", ")))?;
            for column in schema.columns.values() {
                register_column(&tx, &schema.name, column)?;
            }
            tx.commit()?;
            Ok(())
        })?;

        debug!(collection = %schema.name, columns = schema.columns.len(), "collection created");
        Ok(self.replace_schema(schema))
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
        let mut schema = (*self.schema(collection)?).clone();
        schema.add_column(column.clone())?;

        self.pool.with_connection(None, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_identifier(collection),
                quote_identifier(&column.name),
                column.column_type.sql_type()
            ))?;
            register_column(&tx, collection, &column)?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(self.replace_schema(schema))
    }

    fn remove_column(&self, collection: &str, column: &str) -> Result<Arc<CollectionSchema>> {
        let mut schema = (*self.schema(collection)?).clone();
        schema.remove_column(column)?;

        self.pool.with_connection(None, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&format!(
                "DROP INDEX IF EXISTS {}",
                quote_identifier(&index_name(collection, column))
            ))?;
            tx.execute_batch(&format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_identifier(collection),
                quote_identifier(column)
            ))?;
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE collection = ?1 AND name = ?2",
                    quote_identifier(CATALOG_TABLE)
                ),
                params![collection, column],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(self.replace_schema(schema))
    }

    fn iterate(
        &self,
        plan: &QueryPlan<'_>,
        transaction: Option<&str>,
        callback: &mut dyn FnMut(Record) -> bool,
    ) -> Result<()> {
        let statement = self.compiler().select(plan)?;
        let columns: Vec<(String, ColumnType)> = plan
            .result_columns()
            .into_iter()
            .map(|name| -> Result<(String, ColumnType)> {
                Ok((name.to_string(), plan.schema.column(name)?.column_type.clone()))
            })
            .collect::<Result<_>>()?;

        debug!(sql = %statement.sql, params = statement.params.len(), "select");
        self.pool.with_connection(transaction, |conn| {
            let mut stmt = conn.prepare(&statement.sql)?;
            let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                for (index, (name, column_type)) in columns.iter().enumerate() {
                    record.set(name.clone(), from_sql_value(row.get_ref(index)?, column_type)?);
                }
                if !callback(record) {
                    break;
                }
            }
            Ok(())
        })
    }

    fn count(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize> {
        let statement = self.compiler().count(plan)?;
        debug!(sql = %statement.sql, params = statement.params.len(), "count");
        let count: i64 = self.pool.with_connection(transaction, |conn| {
            Ok(conn.query_row(&statement.sql, params_from_iter(statement.params.iter()), |row| row.get(0))?)
        })?;
        Ok(count.max(0) as usize)
    }

    fn distinct(&self, plan: &QueryPlan<'_>, column: &str, transaction: Option<&str>) -> Result<Vec<Value>> {
        let statement = self.compiler().distinct(plan, column)?;
        let column_type = plan.schema.column(column)?.column_type.clone();

        debug!(sql = %statement.sql, params = statement.params.len(), "distinct");
        self.pool.with_connection(transaction, |conn| {
            let mut stmt = conn.prepare(&statement.sql)?;
            let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
            let mut values = Vec::new();
            while let Some(row) = rows.next()? {
                values.push(from_sql_value(row.get_ref(0)?, &column_type)?);
            }
            Ok(values)
        })
    }

    fn save(&self, schema: &CollectionSchema, record: Record, transaction: Option<&str>) -> Result<()> {
        let mut names = Vec::with_capacity(record.len());
        let mut params = Vec::with_capacity(record.len());
        for (name, value) in &record.fields {
            schema.column(name)?;
            names.push(quote_identifier(name));
            params.push(to_sql_value(value)?);
        }

        let updates: Vec<String> = record
            .fields
            .keys()
            .filter(|name| name.as_str() != ID_COLUMN)
            .map(|name| format!("{0} = excluded.{0}", quote_identifier(name)))
            .collect();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let statement = SqlFragment {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
                quote_identifier(&schema.name),
                names.join(", "),
                vec!["?"; names.len()].join(", "),
                quote_identifier(ID_COLUMN),
                on_conflict
            ),
            params,
        };
        self.execute(&statement, transaction)?;
        Ok(())
    }

    fn delete(&self, plan: &QueryPlan<'_>, transaction: Option<&str>) -> Result<usize> {
        let statement = self.compiler().delete(plan)?;
        self.execute(&statement, transaction)
    }

    fn begin(&self, name: Option<String>) -> Result<String> {
        self.pool.begin(name)
    }

    fn commit(&self, id: &str) -> Result<()> {
        self.pool.commit(id)
    }

    fn rollback(&self, id: &str) -> Result<()> {
        self.pool.rollback(id)
    }

    fn has_transaction(&self, id: &str) -> bool {
        self.pool.has_transaction(id)
    }

    fn raw_query(&self, query: &str, transaction: Option<&str>) -> Result<Vec<Record>> {
        debug!(sql = %query, "raw query");
        self.pool.with_connection(transaction, |conn| {
            let mut stmt = conn.prepare(query)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                for (index, name) in names.iter().enumerate() {
                    record.set(name.clone(), untyped(row.get_ref(index)?));
                }
                records.push(record);
            }
            Ok(records)
        })
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(self.pool.stats())
    }

    fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}

fn register_column(conn: &Connection, collection: &str, column: &ColumnDefinition) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (collection, name, type, indexed) VALUES (?1, ?2, ?3, ?4)",
            quote_identifier(CATALOG_TABLE)
        ),
        params![collection, column.name, column.column_type.to_string(), column.indexed],
    )?;

    if column.indexed && column.name != ID_COLUMN {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_identifier(&index_name(collection, &column.name)),
            quote_identifier(collection),
            quote_identifier(&column.name)
        ))?;
    }
    Ok(())
}

fn index_name(collection: &str, column: &str) -> String {
    format!("idx_{}_{}", collection, column)
}

fn unknown_collection(name: &str) -> Error {
    Error::new(ErrorKind::UnknownCollection, format!("no collection '{}'", name))
}

fn collection_exists(name: &str) -> Error {
    Error::new(
        ErrorKind::CollectionAlreadyExists,
        format!("collection '{}' already exists", name),
    )
}
