pub mod core;
pub mod schema;
pub mod filter;
pub mod query;
pub mod storage;
pub mod engine;
pub mod collection;

pub use crate::collection::collection::Collection;
pub use crate::core::config::{BackendKind, Config};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Record, RecordId, Value, ID_COLUMN};
pub use crate::engine::database::Database;
pub use crate::schema::column::{ColumnDefinition, ColumnType};

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              SELDEX STRUCT ARCHITECTURE                                     │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── FACADE LAYER ───────────────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────────────────────┐   ┌──────────────────────────────────────────┐    │
│  │ struct Database                      │   │ struct Collection (Clone)                │    │
│  │ • config: Config                     │──▶│ • name: String                           │    │
│  │ • backend: Arc<dyn Backend>          │   │ • backend: Arc<dyn Backend>              │    │
│  │                                      │   │ • filters: FilterTree                    │    │
│  │ create/get/has_collection            │   │ • sort: Vec<SortKey>                     │    │
│  │ begin/commit/rollback_transaction    │   │ • columns, offset, limit                 │    │
│  │ raw_query(_on_transaction)           │   │ • transaction: Option<String>            │    │
│  └──────────────────────────────────────┘   └──────────────────────────────────────────┘    │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
                                              │ QueryPlan { schema, filters, sort, columns, .. }
                                              ▼
┌──────────────────────────────────── QUERY LAYER ────────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────┐   ┌─────────────────────────┐   ┌───────────────────────────┐   │
│  │ struct FilterTree      │   │ struct OperatorTranslator│  │ trait QueryCompiler       │   │
│  │ groups: BTreeMap<      │──▶│ (column, op, value)     │──▶│ compile(): leaves-first   │   │
│  │   name, FilterGroup>   │   │   → coerce → Predicate  │   │ collapse of the forest    │   │
│  │ parent links by name   │   └─────────────────────────┘   └─────────────┬─────────────┘   │
│  └────────────────────────┘                                               │                 │
│                                          ┌────────────────────────────────┴──────────┐      │
│                                          ▼                                           ▼      │
│                          ┌───────────────────────────────┐   ┌──────────────────────────┐   │
│                          │ SqlCompiler → SqlFragment     │   │ DocumentCompiler → JSON  │   │
│                          │ WHERE with bound parameters,  │   │ $and/$or/$eq/...         │   │
│                          │ sub-queries inlined as SELECT │   │ sub-queries resolved now │   │
│                          └───────────────────────────────┘   └──────────────────────────┘   │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── STORAGE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────────────────────────┐   ┌──────────────────────────────────────┐    │
│  │ SqliteBackend                            │   │ DocumentBackend                      │    │
│  │ • pool: ConnectionPool                   │   │ • store: RwLock<DocumentStore>       │    │
│  │ • schemas (catalog table "_columns")     │   │ • journal: Option<Mutex<Journal>>    │    │
│  └───────────────────┬──────────────────────┘   │ • schemas (replayed from journal)    │    │
│                      ▼                          └──────────────────────────────────────┘    │
│  ┌──────────────────────────────────────────┐                                                │
│  │ ConnectionPool                           │   state: Mutex<PoolState>                     │
│  │ • connections: Vec<Arc<PooledConnection>>│   ├─ least-busy unpinned selection            │
│  │ • transactions: id → BoundTransaction    │   ├─ growth up to max_connections             │
│  │ • per-connection Mutex<Connection>       │   └─ transaction pinned to one connection     │
│  └──────────────────────────────────────────┘                                                │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
