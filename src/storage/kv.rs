//! Key/value persistence behind the sync engine.
//!
//! The engine only needs `get`/`set`/`update`/`remove` of string values, so it can run
//! against the `SQLite` database, or an in-memory map under test, without
//! code changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::Database;
use crate::error::DaybookError;

/// Durable string key/value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, DaybookError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    fn set(&self, key: &str, value: &str) -> Result<(), DaybookError>;

    /// Replace the value under `key` with `edit(current)` as one atomic step.
    ///
    /// Other handles on the same storage, including other processes, never
    /// observe or interleave a write between the read and the write.
    ///
    /// # Errors
    ///
    /// Returns the error from `edit`, or an error if the storage rejects the
    /// read or write. The stored value is unchanged then.
    fn update(
        &self,
        key: &str,
        edit: &mut dyn FnMut(Option<String>) -> Result<String, DaybookError>,
    ) -> Result<(), DaybookError>;

    /// Delete `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    fn remove(&self, key: &str) -> Result<(), DaybookError>;
}

/// `SQLite`-backed store using the `kv_store` table.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Wrap an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, DaybookError>,
    ) -> Result<T, DaybookError> {
        let db = self
            .db
            .lock()
            .map_err(|_| DaybookError::Storage("database lock poisoned".to_string()))?;
        f(&db)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, DaybookError> {
        self.with_db(|db| read_value(db.connection(), key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DaybookError> {
        self.with_db(|db| write_value(db.connection(), key, value))
    }

    fn update(
        &self,
        key: &str,
        edit: &mut dyn FnMut(Option<String>) -> Result<String, DaybookError>,
    ) -> Result<(), DaybookError> {
        self.with_db(|db| {
            // IMMEDIATE holds the write lock from the read through the write.
            let tx = Transaction::new_unchecked(db.connection(), TransactionBehavior::Immediate)
                .map_err(|e| DaybookError::Database(format!("Failed to begin update of {key}: {e}")))?;
            let current = read_value(&tx, key)?;
            let next = edit(current)?;
            write_value(&tx, key, &next)?;
            tx.commit()
                .map_err(|e| DaybookError::Database(format!("Failed to commit {key}: {e}")))
        })
    }

    fn remove(&self, key: &str) -> Result<(), DaybookError> {
        self.with_db(|db| {
            db.connection()
                .execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .map_err(|e| DaybookError::Database(format!("Failed to delete {key}: {e}")))?;
            Ok(())
        })
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>, DaybookError> {
    conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| row.get(0))
        .optional()
        .map_err(|e| DaybookError::Database(format!("Failed to read {key}: {e}")))
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<(), DaybookError> {
    conn.execute(
        r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
          ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )
    .map_err(|e| DaybookError::Database(format!("Failed to write {key}: {e}")))?;
    Ok(())
}

/// In-memory store for tests and ephemeral engines.
///
/// Writes can be switched to fail to simulate a full or read-only disk.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, DaybookError> {
        self.entries
            .lock()
            .map_err(|_| DaybookError::Storage("memory store lock poisoned".to_string()))
    }

    fn check_writable(&self) -> Result<(), DaybookError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DaybookError::Storage("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DaybookError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DaybookError> {
        self.check_writable()?;
        self.entries()?.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        edit: &mut dyn FnMut(Option<String>) -> Result<String, DaybookError>,
    ) -> Result<(), DaybookError> {
        let mut entries = self.entries()?;
        let next = edit(entries.get(key).cloned())?;
        self.check_writable()?;
        entries.insert(key.to_string(), next);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DaybookError> {
        self.check_writable()?;
        self.entries()?.remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_store() -> SqliteStore {
        SqliteStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_sqlite_get_missing() {
        let store = sqlite_store();
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn test_sqlite_set_overwrites() {
        let store = sqlite_store();

        store.set("sync_status", "{}").unwrap();
        store.set("sync_status", r#"{"lastSync":null}"#).unwrap();

        assert_eq!(
            store.get("sync_status").unwrap().as_deref(),
            Some(r#"{"lastSync":null}"#)
        );
    }

    #[test]
    fn test_sqlite_remove() {
        let store = sqlite_store();

        store.set("pending_changes", "[]").unwrap();
        store.remove("pending_changes").unwrap();
        store.remove("pending_changes").unwrap();

        assert_eq!(store.get("pending_changes").unwrap(), None);
    }

    #[test]
    fn test_sqlite_update_sees_other_handle_writes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("kv.db");
        let first = SqliteStore::new(Database::open_at(&path).unwrap());
        let second = SqliteStore::new(Database::open_at(&path).unwrap());

        first.set("log", "a").unwrap();
        second
            .update("log", &mut |current| Ok(format!("{}b", current.unwrap_or_default())))
            .unwrap();
        first
            .update("log", &mut |current| Ok(format!("{}c", current.unwrap_or_default())))
            .unwrap();

        assert_eq!(second.get("log").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_update_error_leaves_value() {
        let store = sqlite_store();
        store.set("k", "v").unwrap();

        let err = store
            .update("k", &mut |_| Err(DaybookError::Storage("rejected".to_string())))
            .unwrap_err();

        assert!(matches!(err, DaybookError::Storage(_)));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("kv.db");

        {
            let store = SqliteStore::new(Database::open_at(&path).unwrap());
            store.set("k", "v").unwrap();
        }

        let store = SqliteStore::new(Database::open_at(&path).unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_store_failing_writes() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();

        store.set_fail_writes(true);
        assert!(matches!(store.set("a", "2"), Err(DaybookError::Storage(_))));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        assert!(store.update("a", &mut |_| Ok("2".to_string())).is_err());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set_fail_writes(false);
        store.set("a", "3").unwrap();
        assert_eq!(store.write_count(), 2);
    }
}
