use std::path::PathBuf;
use std::fs;
use crate::core::error::Result;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,        // Root directory
    pub relational_path: PathBuf, // SQLite database file
    pub journal_path: PathBuf,    // Document backend journal
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;

        Ok(StorageLayout {
            relational_path: base_dir.join("relational.sqlite3"),
            journal_path: base_dir.join("documents.journal"),
            base_dir,
        })
    }
}
