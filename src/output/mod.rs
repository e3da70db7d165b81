//! Output formatting for daybook.
//!
//! This module provides formatters for displaying queue and sync state in
//! various formats.

mod json;
mod pretty;

use std::collections::BTreeMap;

use crate::cli::args::OutputFormat;
use crate::error::DaybookError;
use crate::sync::{
    format_drain_outcome, DrainOutcome, FailedChange, PendingChange, SyncStatus, TargetDomain,
};

pub use json::*;
pub use pretty::*;

/// Format the sync status based on output format
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_status(
    status: &SyncStatus,
    failures: &BTreeMap<TargetDomain, usize>,
    format: OutputFormat,
) -> Result<String, DaybookError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(status, failures)),
        OutputFormat::Json => format_status_json(status, failures),
    }
}

/// Format pending changes based on output format
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_pending(changes: &[PendingChange], format: OutputFormat) -> Result<String, DaybookError> {
    match format {
        OutputFormat::Pretty => Ok(format_pending_pretty(changes)),
        OutputFormat::Json => format_pending_json(changes),
    }
}

/// Format failed changes based on output format
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_failed(failed: &[FailedChange], format: OutputFormat) -> Result<String, DaybookError> {
    match format {
        OutputFormat::Pretty => Ok(format_failed_pretty(failed)),
        OutputFormat::Json => format_failed_json(failed),
    }
}

/// Format a drain outcome based on output format
///
/// # Errors
///
/// Returns `DaybookError::Parse` if JSON serialization fails.
pub fn format_drain(outcome: &DrainOutcome, format: OutputFormat) -> Result<String, DaybookError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_outcome(outcome)),
        OutputFormat::Json => to_json(outcome),
    }
}
