//! Receipt store.
//!
//! SQLite table `blocks(digest, timestamp)` recording feeless anchoring
//! receipts. Rows are only ever appended and are read newest first.
//! Timestamps are stored as integer epoch seconds.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(u64),

    #[error("Stored timestamp {0} is out of range")]
    CorruptTimestamp(i64),

    #[error("Receipt store lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One anchoring receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub digest: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ReceiptStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl ReceiptStore {
    /// Open or create the database, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    StorageError::DirectoryCreate {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }

        let conn = Connection::open(&path).map_err(|source| StorageError::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        initialize_schema(&conn)?;

        info!(path = %path.display(), "Receipt store opened");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a receipt. `timestamp` is epoch seconds and must be
    /// representable as a UTC date.
    pub fn record(&self, digest: &str, timestamp: u64) -> StorageResult<()> {
        let secs = i64::try_from(timestamp)
            .ok()
            .filter(|secs| DateTime::from_timestamp(*secs, 0).is_some())
            .ok_or(StorageError::InvalidTimestamp(timestamp))?;

        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT INTO blocks (digest, timestamp) VALUES (?1, ?2)",
            params![digest, secs],
        )?;

        debug!(digest, timestamp, "Recorded receipt");
        Ok(())
    }

    /// Most recent receipts first.
    pub fn recent(&self, limit: usize) -> StorageResult<Vec<Receipt>> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT digest, timestamp FROM blocks ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut receipts = Vec::new();
        for row in rows {
            let (digest, secs) = row?;
            let timestamp =
                DateTime::from_timestamp(secs, 0).ok_or(StorageError::CorruptTimestamp(secs))?;
            receipts.push(Receipt { digest, timestamp });
        }
        Ok(receipts)
    }

    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    for statement in schema::SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_newest_first() {
        let store = ReceiptStore::open_in_memory().unwrap();
        store.record("0xold", 1_700_000_000).unwrap();
        store.record("0xnew", 1_741_953_600).unwrap();
        store.record("0xmid", 1_720_000_000).unwrap();

        let receipts = store.recent(10).unwrap();
        let digests: Vec<&str> = receipts.iter().map(|r| r.digest.as_str()).collect();
        assert_eq!(digests, vec!["0xnew", "0xmid", "0xold"]);
        assert_eq!(receipts[0].timestamp.timestamp(), 1_741_953_600);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_limit() {
        let store = ReceiptStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.record(&format!("d{i}"), 1_700_000_000 + i).unwrap();
        }
        assert_eq!(store.recent(2).unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_timestamp() {
        let store = ReceiptStore::open_in_memory().unwrap();
        assert!(matches!(
            store.record("d", u64::MAX),
            Err(StorageError::InvalidTimestamp(_))
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_orders_beyond_year_9999() {
        let store = ReceiptStore::open_in_memory().unwrap();
        // 10000-01-01 and 2025-03-14.
        store.record("far", 253_402_300_800).unwrap();
        store.record("near", 1_741_953_600).unwrap();

        let receipts = store.recent(10).unwrap();
        assert_eq!(receipts[0].digest, "far");
        assert_eq!(receipts[0].timestamp.timestamp(), 253_402_300_800);
        assert_eq!(receipts[1].digest, "near");
    }

    #[test]
    fn test_text_timestamps_are_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(schema::CREATE_BLOCKS_TABLE).unwrap();
            conn.execute(
                "INSERT INTO blocks (digest, timestamp) VALUES ('old', '2025-03-14 12:00:00')",
                [],
            )
            .unwrap();
        }

        let store = ReceiptStore::open(&path).unwrap();
        store.record("new", 1_741_953_601).unwrap();

        let receipts = store.recent(10).unwrap();
        assert_eq!(receipts[0].digest, "new");
        assert_eq!(receipts[1].digest, "old");
        assert_eq!(receipts[1].timestamp.timestamp(), 1_741_953_600);
    }

    #[test]
    fn test_open_on_disk_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("receipts.db");

        {
            let store = ReceiptStore::open(&path).unwrap();
            store.record("0xabc", 1_741_953_600).unwrap();
        }

        let reopened = ReceiptStore::open(&path).unwrap();
        assert_eq!(reopened.recent(1).unwrap()[0].digest, "0xabc");
        assert_eq!(reopened.path(), path.as_path());
    }
}
