pub mod layout;
pub mod sqlite;
pub mod pool;
pub mod matcher;
pub mod document_store;
pub mod journal;
