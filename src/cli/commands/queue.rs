//! Queue management commands.
//!
//! Inspect, extend and prune the offline change queue without talking to the
//! backend.

use serde_json::{json, Value};

use crate::cli::args::OutputFormat;
use crate::error::DaybookError;
use crate::output::{format_enqueued_pretty, format_failed, format_pending, format_status, to_json};
use crate::sync::SyncEngine;

/// Show connectivity, queue size and the last sync result.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn status(engine: &SyncEngine, format: OutputFormat) -> Result<String, DaybookError> {
    format_status(&engine.status(), &engine.failure_summary(), format)
}

/// List pending changes, or the permanently failed ones.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn list(engine: &SyncEngine, failed: bool, format: OutputFormat) -> Result<String, DaybookError> {
    if failed {
        format_failed(&engine.failed(), format)
    } else {
        format_pending(&engine.pending(), format)
    }
}

/// Record a change from command-line input.
///
/// # Errors
///
/// Returns an error for an unknown kind or domain, a payload that is not a
/// JSON object, or when the queue cannot be persisted.
pub fn add(
    engine: &SyncEngine,
    kind: &str,
    domain: &str,
    payload: &str,
    format: OutputFormat,
) -> Result<String, DaybookError> {
    let payload: Value = serde_json::from_str(payload)?;
    if !payload.is_object() {
        return Err(DaybookError::Config(
            "Payload must be a JSON object".to_string(),
        ));
    }

    let change = engine.enqueue_named(kind, domain, payload)?;

    match format {
        OutputFormat::Json => to_json(&change),
        OutputFormat::Pretty => Ok(format_enqueued_pretty(&change, engine.pending_count())),
    }
}

/// Re-queue permanently failed changes, or only the one with `id`.
///
/// # Errors
///
/// Returns an error if `id` names no failed change or the queue cannot be
/// persisted.
pub fn retry(engine: &SyncEngine, id: Option<&str>, format: OutputFormat) -> Result<String, DaybookError> {
    let count = match id {
        Some(id) => {
            engine.retry_failed_change(id)?;
            1
        }
        None => engine.retry_failed()?,
    };

    match format {
        OutputFormat::Json => to_json(&json!({
            "requeued": count,
            "pending": engine.pending_count(),
        })),
        OutputFormat::Pretty => Ok(if count == 0 {
            "No failed changes to retry.".to_string()
        } else {
            format!("Re-queued {count} failed changes for retry")
        }),
    }
}

/// Clear the failed list, or discard pending changes with `force`.
///
/// # Errors
///
/// Returns an error if pending changes would be discarded without `force`,
/// or if the emptied list cannot be persisted.
pub fn clear(
    engine: &SyncEngine,
    failed: bool,
    force: bool,
    format: OutputFormat,
) -> Result<String, DaybookError> {
    let (count, what) = if failed {
        (engine.clear_failed()?, "failed")
    } else {
        if !force {
            return Err(DaybookError::Config(
                "Use --force to discard pending changes that were never sent".to_string(),
            ));
        }
        (engine.discard_pending()?, "pending")
    };

    match format {
        OutputFormat::Json => to_json(&json!({"cleared": count, "list": what})),
        OutputFormat::Pretty => Ok(format!("Cleared {count} {what} changes")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStore;
    use crate::sync::{DomainRouter, EngineSettings, ManualConnectivity};

    fn engine() -> SyncEngine {
        SyncEngine::open(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualConnectivity::new(false)),
            DomainRouter::new(),
            EngineSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_add_then_list() {
        let engine = engine();
        let out = add(&engine, "create", "task", r#"{"title":"Buy milk"}"#, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["type"], "create");
        assert_eq!(value["entity"], "task");

        let out = list(&engine, false, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["items"][0]["data"]["title"], "Buy milk");
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let engine = engine();
        assert!(matches!(
            add(&engine, "create", "task", "not json", OutputFormat::Pretty),
            Err(DaybookError::Parse(_))
        ));
        assert!(matches!(
            add(&engine, "create", "task", "[1, 2]", OutputFormat::Pretty),
            Err(DaybookError::Config(_))
        ));
        assert!(matches!(
            add(&engine, "rename", "task", "{}", OutputFormat::Pretty),
            Err(DaybookError::UnknownOperation(_))
        ));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_clear_pending_requires_force() {
        let engine = engine();
        add(&engine, "create", "mood", r#"{"score":3}"#, OutputFormat::Pretty).unwrap();

        assert!(clear(&engine, false, false, OutputFormat::Pretty).is_err());
        assert_eq!(engine.pending_count(), 1);

        let out = clear(&engine, false, true, OutputFormat::Pretty).unwrap();
        assert_eq!(out, "Cleared 1 pending changes");
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_retry_with_nothing_failed() {
        let engine = engine();
        assert_eq!(
            retry(&engine, None, OutputFormat::Pretty).unwrap(),
            "No failed changes to retry."
        );
        assert!(matches!(
            retry(&engine, Some("missing"), OutputFormat::Pretty),
            Err(DaybookError::NotFound(_))
        ));
    }

    #[test]
    fn test_status_json() {
        let engine = engine();
        add(&engine, "update", "habit", r#"{"id":"h-1"}"#, OutputFormat::Pretty).unwrap();

        let out = status(&engine, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"]["pending_count"], 1);
        assert_eq!(value["status"]["connectivity"], "offline");
    }
}
