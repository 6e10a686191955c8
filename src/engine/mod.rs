pub mod backend;
pub mod sql_backend;
pub mod document_backend;
pub mod database;
