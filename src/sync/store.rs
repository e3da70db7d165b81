//! Persistent queue store.
//!
//! Serializes the pending-change log, the dead-letter list and the sync
//! metadata into a [`KeyValueStore`]. Loading is lenient: a malformed entry
//! is skipped with a warning instead of failing the whole load.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::change::{FailedChange, PendingChange};
use super::status::SyncStatusRecord;
use crate::error::DaybookError;
use crate::storage::KeyValueStore;

/// Key of the pending-change log.
pub const PENDING_CHANGES_KEY: &str = "pending_changes";
/// Key of the sync metadata record.
pub const SYNC_STATUS_KEY: &str = "sync_status";
/// Key of the permanently failed changes.
pub const FAILED_CHANGES_KEY: &str = "failed_changes";

/// Typed access to the engine's persisted state.
#[derive(Clone)]
pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
}

impl QueueStore {
    /// Create a queue store over a key/value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the pending queue in stored (enqueue) order.
    ///
    /// Entries that fail to parse, and later entries repeating an ID, are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself cannot be read.
    pub fn load_queue(&self) -> Result<Vec<PendingChange>, DaybookError> {
        let changes = self.load_list(PENDING_CHANGES_KEY)?;
        Ok(unique_ids(changes))
    }

    /// Overwrite the stored queue.
    #[cfg(test)]
    pub fn save_queue(&self, queue: &[PendingChange]) -> Result<(), DaybookError> {
        self.save_json(PENDING_CHANGES_KEY, queue)
    }

    /// Re-read the stored queue, let `edit` change it and write it back, as
    /// one atomic step. Returns the queue as written.
    ///
    /// Edits made by other handles on the same storage are kept: `edit` only
    /// ever sees the latest stored queue.
    ///
    /// # Errors
    ///
    /// Returns the error from `edit`, or an error if the read or write fails.
    /// Nothing is written then.
    pub fn modify_queue(
        &self,
        edit: impl FnOnce(&mut Vec<PendingChange>) -> Result<(), DaybookError>,
    ) -> Result<Vec<PendingChange>, DaybookError> {
        self.modify_list(PENDING_CHANGES_KEY, |changes| {
            *changes = unique_ids(std::mem::take(changes));
            edit(changes)
        })
    }

    /// Delete the stored queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_queue(&self) -> Result<(), DaybookError> {
        self.kv.remove(PENDING_CHANGES_KEY)
    }

    /// Load permanently failed changes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself cannot be read.
    pub fn load_failed(&self) -> Result<Vec<FailedChange>, DaybookError> {
        self.load_list(FAILED_CHANGES_KEY)
    }

    /// Overwrite the stored failed changes.
    #[cfg(test)]
    pub fn save_failed(&self, failed: &[FailedChange]) -> Result<(), DaybookError> {
        self.save_json(FAILED_CHANGES_KEY, failed)
    }

    /// Like [`QueueStore::modify_queue`], for the failed changes.
    ///
    /// # Errors
    ///
    /// Returns the error from `edit`, or an error if the read or write fails.
    pub fn modify_failed(
        &self,
        edit: impl FnOnce(&mut Vec<FailedChange>) -> Result<(), DaybookError>,
    ) -> Result<Vec<FailedChange>, DaybookError> {
        self.modify_list(FAILED_CHANGES_KEY, edit)
    }

    /// Delete the stored failed changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_failed(&self) -> Result<(), DaybookError> {
        self.kv.remove(FAILED_CHANGES_KEY)
    }

    /// Load sync metadata, falling back to defaults if absent or corrupted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself cannot be read.
    pub fn load_status(&self) -> Result<SyncStatusRecord, DaybookError> {
        let Some(raw) = self.kv.get(SYNC_STATUS_KEY)? else {
            return Ok(SyncStatusRecord::default());
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring corrupted sync status");
            SyncStatusRecord::default()
        }))
    }

    /// Persist sync metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_status(&self, status: &SyncStatusRecord) -> Result<(), DaybookError> {
        self.save_json(SYNC_STATUS_KEY, status)
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DaybookError> {
        let json = serde_json::to_string(value)?;
        self.kv.set(key, &json)
    }

    fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, DaybookError> {
        Ok(parse_list(key, self.kv.get(key)?.as_deref()))
    }

    fn modify_list<T: Serialize + DeserializeOwned>(
        &self,
        key: &str,
        edit: impl FnOnce(&mut Vec<T>) -> Result<(), DaybookError>,
    ) -> Result<Vec<T>, DaybookError> {
        let mut edit = Some(edit);
        let mut written = Vec::new();
        self.kv.update(key, &mut |raw| {
            let mut items = parse_list(key, raw.as_deref());
            if let Some(edit) = edit.take() {
                edit(&mut items)?;
            }
            let json = serde_json::to_string(&items)?;
            written = items;
            Ok(json)
        })?;
        Ok(written)
    }
}

/// Parse a stored JSON array, skipping entries that do not parse.
fn parse_list<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!(key, kind = json_kind(&other), "Stored list is not an array; ignoring it");
            return Vec::new();
        }
        Err(e) => {
            warn!(key, error = %e, "Stored list is not valid JSON; ignoring it");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(parsed) => out.push(parsed),
            Err(e) => warn!(key, index, error = %e, "Skipping malformed stored entry"),
        }
    }
    out
}

/// Keep the first change for each ID.
fn unique_ids(changes: Vec<PendingChange>) -> Vec<PendingChange> {
    let mut seen = HashSet::new();
    changes
        .into_iter()
        .filter(|change| {
            let fresh = seen.insert(change.id.clone());
            if !fresh {
                warn!(id = %change.id, "Skipping duplicate pending change");
            }
            fresh
        })
        .collect()
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, MemoryStore, SqliteStore};
    use crate::sync::change::{OperationKind, TargetDomain};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn change(domain: TargetDomain, id: &str) -> PendingChange {
        let mut c = PendingChange::new(
            OperationKind::Update,
            domain,
            json!({"id": id}),
            Utc.with_ymd_and_hms(2024, 12, 15, 9, 0, 0).unwrap(),
        );
        c.id = format!("c-{id}");
        c
    }

    fn memory_store() -> (Arc<MemoryStore>, QueueStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = QueueStore::new(kv.clone());
        (kv, store)
    }

    #[test]
    fn test_load_empty() {
        let (_, store) = memory_store();
        assert!(store.load_queue().unwrap().is_empty());
        assert!(store.load_failed().unwrap().is_empty());
        assert_eq!(store.load_status().unwrap(), SyncStatusRecord::default());
    }

    #[test]
    fn test_queue_round_trip_on_sqlite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("daybook.db");
        let mut queue = vec![
            change(TargetDomain::Task, "t-1"),
            change(TargetDomain::Mood, "m-1"),
            change(TargetDomain::CalendarEvent, "e-1"),
        ];
        queue[1].retry_count = 2;

        {
            let kv = Arc::new(SqliteStore::new(Database::open_at(&path).unwrap()));
            QueueStore::new(kv).save_queue(&queue).unwrap();
        }

        let kv = Arc::new(SqliteStore::new(Database::open_at(&path).unwrap()));
        let loaded = QueueStore::new(kv).load_queue().unwrap();
        assert_eq!(loaded, queue);
    }

    #[test]
    fn test_load_skips_malformed_entries() {
        let (kv, store) = memory_store();
        let good = change(TargetDomain::Habit, "h-1");
        let raw = json!([
            serde_json::to_value(&good).unwrap(),
            {"id": "bad-1", "type": "teleport", "entity": "task", "data": {}, "timestamp": "2024-12-15T09:00:00Z"},
            {"id": "bad-2", "type": "create", "entity": "task", "data": {}, "timestamp": "yesterday"},
            42
        ]);
        kv.set(PENDING_CHANGES_KEY, &raw.to_string()).unwrap();

        let loaded = store.load_queue().unwrap();
        assert_eq!(loaded, vec![good]);
    }

    #[test]
    fn test_load_tolerates_non_array_blob() {
        let (kv, store) = memory_store();
        kv.set(PENDING_CHANGES_KEY, "{not json").unwrap();
        assert!(store.load_queue().unwrap().is_empty());

        kv.set(PENDING_CHANGES_KEY, r#"{"id":"x"}"#).unwrap();
        assert!(store.load_queue().unwrap().is_empty());
    }

    #[test]
    fn test_load_drops_duplicate_ids() {
        let (_, store) = memory_store();
        let first = change(TargetDomain::Task, "t-1");
        let mut dup = first.clone();
        dup.retry_count = 1;

        store.save_queue(&[first.clone(), dup]).unwrap();

        assert_eq!(store.load_queue().unwrap(), vec![first]);
    }

    #[test]
    fn test_missing_retry_count_defaults_to_zero() {
        let (kv, store) = memory_store();
        kv.set(
            PENDING_CHANGES_KEY,
            r#"[{"id":"c-1","type":"create","entity":"journal","data":{"body":"hi"},"timestamp":"2024-12-15T09:00:00Z"}]"#,
        )
        .unwrap();

        let loaded = store.load_queue().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].retry_count, 0);
    }

    #[test]
    fn test_corrupted_status_falls_back() {
        let (kv, store) = memory_store();
        kv.set(SYNC_STATUS_KEY, "[]").unwrap();
        assert_eq!(store.load_status().unwrap(), SyncStatusRecord::default());
    }

    #[test]
    fn test_save_propagates_write_failure() {
        let (kv, store) = memory_store();
        kv.set_fail_writes(true);

        let err = store.save_queue(&[change(TargetDomain::Task, "t-1")]).unwrap_err();
        assert!(matches!(err, DaybookError::Storage(_)));
    }

    #[test]
    fn test_modify_queue_keeps_other_handles_changes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("daybook.db");
        let open = || QueueStore::new(Arc::new(SqliteStore::new(Database::open_at(&path).unwrap())));
        let watcher = open();
        let one_shot = open();

        watcher.save_queue(&[change(TargetDomain::Task, "t-1")]).unwrap();
        one_shot
            .modify_queue(|queue| {
                queue.push(change(TargetDomain::Journal, "j-1"));
                Ok(())
            })
            .unwrap();

        let written = watcher
            .modify_queue(|queue| {
                queue.retain(|c| c.id != "c-t-1");
                Ok(())
            })
            .unwrap();

        assert_eq!(written, vec![change(TargetDomain::Journal, "j-1")]);
        assert_eq!(one_shot.load_queue().unwrap(), written);
    }

    #[test]
    fn test_modify_queue_error_writes_nothing() {
        let (kv, store) = memory_store();
        store.save_queue(&[change(TargetDomain::Task, "t-1")]).unwrap();
        let writes = kv.write_count();

        let err = store
            .modify_queue(|_| Err(DaybookError::Storage("duplicate".to_string())))
            .unwrap_err();

        assert!(matches!(err, DaybookError::Storage(_)));
        assert_eq!(kv.write_count(), writes);
        assert_eq!(store.load_queue().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_removes_keys() {
        let (kv, store) = memory_store();
        store.save_queue(&[change(TargetDomain::Task, "t-1")]).unwrap();
        store
            .modify_failed(|failed| {
                failed.push(FailedChange {
                    change: change(TargetDomain::Mood, "m-1"),
                    error: "HTTP 400".to_string(),
                    failed_at: Utc.with_ymd_and_hms(2024, 12, 16, 7, 0, 0).unwrap(),
                });
                Ok(())
            })
            .unwrap();

        store.clear_queue().unwrap();
        store.clear_failed().unwrap();

        assert_eq!(kv.get(PENDING_CHANGES_KEY).unwrap(), None);
        assert_eq!(kv.get(FAILED_CHANGES_KEY).unwrap(), None);
    }

    #[test]
    fn test_failed_round_trip() {
        let (_, store) = memory_store();
        let failed = vec![FailedChange {
            change: change(TargetDomain::Journal, "j-1"),
            error: "HTTP 500".to_string(),
            failed_at: Utc.with_ymd_and_hms(2024, 12, 16, 7, 0, 0).unwrap(),
        }];

        store.save_failed(&failed).unwrap();
        assert_eq!(store.load_failed().unwrap(), failed);
    }
}
