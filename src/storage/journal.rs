use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::schema::column::{CollectionSchema, ColumnDefinition};
use crate::storage::document_store::JsonMap;

/// Largest entry accepted on replay
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;
/// Batch mode syncs after this many unsynced bytes
const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Immediate,  // fsync after every write
    Batch,      // fsync once enough bytes accumulated
    None,       // Let OS handle it
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub operation: JournalOp,
    pub timestamp: DateTime<Utc>,
}

/// Catalog and data mutations of the document backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalOp {
    CreateCollection(CollectionSchema),
    AddColumn { collection: String, column: ColumnDefinition },
    RemoveColumn { collection: String, column: String },
    Upsert { collection: String, id: String, fields: JsonMap },
    Delete { collection: String, ids: Vec<String> },
}

/// Append-only journal: `u32 length | u32 crc32 | JSON entry`
pub struct Journal {
    file: File,
    path: PathBuf,
    position: u64,
    sync_mode: SyncMode,
    sequence: u64,
    unsynced: u64,
}

impl Journal {
    /// Open (creating if needed) and replay the journal.
    ///
    /// A torn or corrupt tail stops replay; it is truncated so later appends
    /// stay readable.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let (entries, valid_len) = read_entries(&mut file, &path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating corrupt journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        let sequence = entries.last().map_or(0, |entry| entry.sequence + 1);
        debug!(path = %path.display(), entries = entries.len(), "journal replayed");

        Ok((
            Journal {
                file,
                path,
                position: valid_len,
                sync_mode,
                sequence,
                unsynced: 0,
            },
            entries,
        ))
    }

    pub fn append(&mut self, operation: JournalOp) -> Result<()> {
        let entry = JournalEntry {
            sequence: self.sequence,
            operation,
            timestamp: Utc::now(),
        };

        let data = serde_json::to_vec(&entry)?;
        let len = data.len() as u32;
        let checksum = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame.extend_from_slice(&data);
        self.file.write_all(&frame)?;

        self.sequence += 1;
        self.position += frame.len() as u64;
        self.unsynced += frame.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch if self.unsynced >= BATCH_SYNC_BYTES => self.sync()?,
            _ => {}
        }

        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if self.unsynced > 0 {
            if let Err(err) = self.file.sync_data() {
                warn!(path = %self.path.display(), error = %err, "journal sync on close failed");
            }
        }
    }
}

/// Valid entries and the byte length they occupy
fn read_entries(file: &mut File, path: &Path) -> Result<(Vec<JournalEntry>, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::Io,
                    format!("failed to read journal {}: {}", path.display(), e),
                ))
            }
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_ENTRY_SIZE {
            warn!(path = %path.display(), offset = valid_len, len, "journal entry too large");
            break;
        }

        let mut data = vec![0u8; len];
        if reader.read_exact(&mut data).is_err() {
            warn!(path = %path.display(), offset = valid_len, "torn journal entry");
            break;
        }
        if crc32fast::hash(&data) != checksum {
            warn!(path = %path.display(), offset = valid_len, "journal checksum mismatch");
            break;
        }

        match serde_json::from_slice::<JournalEntry>(&data) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), offset = valid_len, error = %e, "undecodable journal entry");
                break;
            }
        }
        valid_len += 8 + len as u64;
    }

    Ok((entries, valid_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn upsert(id: &str) -> JournalOp {
        JournalOp::Upsert {
            collection: "items".to_string(),
            id: id.to_string(),
            fields: JsonMap::new(),
        }
    }

    #[test]
    fn replays_appended_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.journal");

        {
            let (mut journal, entries) = Journal::open(&path, SyncMode::Immediate).unwrap();
            assert!(entries.is_empty());
            journal.append(JournalOp::CreateCollection(CollectionSchema::new("items"))).unwrap();
            journal.append(upsert("a")).unwrap();
        }

        let (_, entries) = Journal::open(&path, SyncMode::None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].sequence, 1);
        assert!(matches!(entries[1].operation, JournalOp::Upsert { ref id, .. } if id == "a"));
    }

    #[test]
    fn corrupt_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.journal");

        {
            let (mut journal, _) = Journal::open(&path, SyncMode::Immediate).unwrap();
            journal.append(upsert("a")).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        }

        let (mut journal, entries) = Journal::open(&path, SyncMode::Immediate).unwrap();
        assert_eq!(entries.len(), 1);
        journal.append(upsert("b")).unwrap();
        drop(journal);

        let (_, entries) = Journal::open(&path, SyncMode::None).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
