//! Named text records, one row per name in `kv_store`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

/// Failure reading or writing a persisted record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The record could not be read.
    #[error("failed to read record {name}: {source}")]
    Read {
        /// Record name.
        name: String,
        /// Underlying database error.
        source: rusqlite::Error,
    },

    /// The record could not be written.
    #[error("failed to write record {name}: {source}")]
    Write {
        /// Record name.
        name: String,
        /// Underlying database error.
        source: rusqlite::Error,
    },

    /// The in-memory state could not be serialized.
    #[error("failed to encode record {name}: {source}")]
    Encode {
        /// Record name.
        name: String,
        /// Serializer error.
        source: serde_json::Error,
    },

    /// The stored text is not a valid record.
    #[error("record {name} is corrupt: {source}")]
    Corrupt {
        /// Record name.
        name: String,
        /// Deserializer error.
        source: serde_json::Error,
    },

    /// The backing store refused the operation.
    #[error("record {name} is unavailable: {message}")]
    Unavailable {
        /// Record name.
        name: String,
        /// Description.
        message: String,
    },
}

/// Durable storage of named text records.
pub trait RecordStore {
    /// Reads a record. Returns `Ok(None)` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn read(&self, name: &str) -> Result<Option<String>, PersistenceError>;

    /// Replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn write(&self, name: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Records stored in the `kv_store` table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps a migrated connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteStore {
    fn read(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| PersistenceError::Read {
                name: String::from(name),
                source,
            })
    }

    fn write(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        self.conn
            .execute(
                "INSERT INTO kv_store (name, value, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                 ON CONFLICT(name) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                [name, value],
            )
            .map(|_| ())
            .map_err(|source| PersistenceError::Write {
                name: String::from(name),
                source,
            })
    }
}

/// Records kept in memory only. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one record.
    #[must_use]
    pub fn with_record(name: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(String::from(name), String::from(value));
        store
    }
}

impl RecordStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn write(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(String::from(name), String::from(value));
        Ok(())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn read(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).write(name, value)
    }
}
