//! JSON output formatting for daybook.
//!
//! This module provides functions for formatting queue and sync state as JSON.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use crate::error::DaybookError;
use crate::sync::{FailedChange, PendingChange, SyncStatus, TargetDomain};

/// Format the sync status and failure summary as JSON
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_status_json(
    status: &SyncStatus,
    failures: &BTreeMap<TargetDomain, usize>,
) -> Result<String, DaybookError> {
    let failures: BTreeMap<&str, usize> = failures
        .iter()
        .map(|(domain, count)| (domain.as_str(), *count))
        .collect();
    let output = json!({
        "status": status,
        "failures_by_domain": failures,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format pending changes as JSON
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_pending_json(changes: &[PendingChange]) -> Result<String, DaybookError> {
    let output = json!({
        "count": changes.len(),
        "items": changes
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format permanently failed changes as JSON
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_failed_json(failed: &[FailedChange]) -> Result<String, DaybookError> {
    let output = json!({
        "count": failed.len(),
        "items": failed
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, DaybookError> {
    Ok(serde_json::to_string_pretty(value)?)
}
