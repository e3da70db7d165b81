//! Synchronizer: drains the pending queue against the backend.
//!
//! A pass snapshots the queue, applies each change oldest-first through the
//! domain router, then merges the outcomes back into the live queue (changes
//! recorded during the pass are kept) and persists everything once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::change::{FailedChange, PendingChange, TargetDomain};
use super::client::ApplyError;
use super::engine::SyncEngine;
use super::events::SyncEvent;
use super::status::SyncStatusRecord;

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Backend unreachable
    Offline,
    /// Another pass holds the single-flight guard
    AlreadyRunning,
    /// Nothing to send
    EmptyQueue,
    /// The engine is shutting down
    ShuttingDown,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::AlreadyRunning => "a sync is already running",
            Self::EmptyQueue => "nothing to sync",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(s)
    }
}

/// Result of a completed drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Changes in the pass snapshot
    pub total: usize,
    /// Changes sent to the backend
    pub attempted: usize,
    /// Changes the backend accepted
    pub succeeded: usize,
    /// Changes that failed and stay queued for another pass
    pub retried: usize,
    /// Changes held back because an earlier change to the same record failed
    pub deferred: usize,
    /// Changes dropped as permanent failures
    pub dropped: Vec<FailedChange>,
    /// One message per dropped change
    pub errors: Vec<String>,
    /// Whether shutdown cut the pass short
    pub interrupted: bool,
}

impl DrainReport {
    /// Whether every attempted change went through.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.attempted && self.dropped.is_empty() && !self.interrupted
    }
}

/// What a drain call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// The pass did not run
    Skipped { reason: SkipReason },
    /// The pass ran to completion (or was interrupted by shutdown)
    Completed(DrainReport),
}

impl DrainOutcome {
    /// The report, if the pass ran.
    #[must_use]
    pub const fn report(&self) -> Option<&DrainReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }

    /// The skip reason, if the pass did not run.
    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            Self::Completed(_) => None,
        }
    }
}

enum EntryOutcome {
    Delivered,
    Retry(u32),
    Dropped,
}

/// Holds the single-flight flag; clears it on drop.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    /// Take the flag, or `None` if another pass holds it.
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    /// Run one drain pass.
    ///
    /// Returns immediately with [`DrainOutcome::Skipped`] when offline, when
    /// another pass is running, when the queue is empty or after shutdown.
    /// Remote and persistence failures never escape: they are recorded in the
    /// report and the log.
    pub async fn drain(&self) -> DrainOutcome {
        if self.is_shut_down() {
            return DrainOutcome::Skipped {
                reason: SkipReason::ShuttingDown,
            };
        }
        if !self.connectivity.is_online() {
            debug!("Skipping drain while offline");
            return DrainOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }
        // Taken before the first await so concurrent triggers cannot both pass.
        let Some(flight) = FlightGuard::acquire(&self.in_flight) else {
            debug!("Drain already running");
            return DrainOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            };
        };

        self.refresh();
        let snapshot = self.pending();
        if snapshot.is_empty() {
            debug!("Nothing to sync");
            return DrainOutcome::Skipped {
                reason: SkipReason::EmptyQueue,
            };
        }

        let report = self.run_pass(snapshot).await;
        drop(flight);

        self.events.emit(SyncEvent::SyncCompleted {
            success_count: report.succeeded,
        });
        if !report.errors.is_empty() {
            self.events.emit(SyncEvent::SyncPartialFailure {
                error_count: report.errors.len(),
            });
        }

        DrainOutcome::Completed(report)
    }

    async fn run_pass(&self, snapshot: Vec<PendingChange>) -> DrainReport {
        let total = snapshot.len();
        let max_retries = self.settings.max_retries;
        let mut report = DrainReport {
            total,
            ..DrainReport::default()
        };
        let mut outcomes: HashMap<String, EntryOutcome> = HashMap::with_capacity(total);
        let mut blocked: HashSet<(TargetDomain, String)> = HashSet::new();

        info!(total, "Sync started");
        self.progress.store(0, Ordering::Relaxed);
        self.events.emit(SyncEvent::SyncStarted);

        for (index, change) in snapshot.into_iter().enumerate() {
            if self.is_shut_down() {
                info!(remaining = total - index, "Sync interrupted by shutdown");
                report.interrupted = true;
                break;
            }

            let record_key = change.record_key();
            if record_key.as_ref().is_some_and(|key| blocked.contains(key)) {
                debug!(id = %change.id, change = %change.describe(), "Deferring change behind failed one");
                report.deferred += 1;
            } else {
                report.attempted += 1;
                match self.apply(&change).await {
                    Ok(()) => {
                        debug!(id = %change.id, change = %change.describe(), "Change delivered");
                        report.succeeded += 1;
                        outcomes.insert(change.id, EntryOutcome::Delivered);
                    }
                    Err(err) => {
                        if let Some(key) = record_key {
                            blocked.insert(key);
                        }
                        let retry_count = change.retry_count.saturating_add(1);

                        if err.is_retryable() && retry_count < max_retries {
                            debug!(
                                id = %change.id,
                                change = %change.describe(),
                                retry_count,
                                error = %err,
                                "Change failed; will retry"
                            );
                            report.retried += 1;
                            outcomes.insert(change.id, EntryOutcome::Retry(retry_count));
                        } else {
                            let message = format!(
                                "{}: {} (after {retry_count} attempt{})",
                                change.describe(),
                                err,
                                if retry_count == 1 { "" } else { "s" }
                            );
                            warn!(id = %change.id, retry_count, error = %err, "Dropping change");

                            let id = change.id.clone();
                            report.errors.push(message);
                            report.dropped.push(FailedChange {
                                change: PendingChange {
                                    retry_count,
                                    ..change
                                },
                                error: err.message().to_string(),
                                failed_at: self.clock.now(),
                            });
                            outcomes.insert(id, EntryOutcome::Dropped);
                        }
                    }
                }
            }

            let percent = progress_percent(index + 1, total);
            self.progress.store(percent, Ordering::Relaxed);
            self.events.emit(SyncEvent::SyncProgress { percent });
        }

        self.finish_pass(&outcomes, &report);

        info!(
            succeeded = report.succeeded,
            retried = report.retried,
            deferred = report.deferred,
            dropped = report.dropped.len(),
            "Sync finished"
        );
        report
    }

    async fn apply(&self, change: &PendingChange) -> Result<(), ApplyError> {
        let timeout = self.settings.request_timeout;
        tokio::time::timeout(timeout, self.router.dispatch(change))
            .await
            .unwrap_or_else(|_| {
                Err(ApplyError::Transient(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )))
            })
    }

    /// Merge outcomes into the stored queue and persist queue, failures and
    /// status. Changes this pass never saw, from this process or another one
    /// sharing the database, are left alone.
    fn finish_pass(&self, outcomes: &HashMap<String, EntryOutcome>, report: &DrainReport) {
        let merge = |queue: &mut Vec<PendingChange>| {
            queue.retain_mut(|change| match outcomes.get(&change.id) {
                Some(EntryOutcome::Delivered | EntryOutcome::Dropped) => false,
                Some(EntryOutcome::Retry(count)) => {
                    change.retry_count = *count;
                    true
                }
                None => true,
            });
        };

        let remaining = {
            let mut queue = self.lock_queue();
            match self.store.modify_queue(|stored| {
                merge(stored);
                Ok(())
            }) {
                Ok(stored) => *queue = stored,
                Err(e) => {
                    warn!(error = %e, "Failed to persist queue after sync");
                    merge(&mut *queue);
                }
            }
            queue.len()
        };

        if !report.dropped.is_empty() {
            let mut failed = self.lock_failed();
            match self.store.modify_failed(|stored| {
                stored.extend(report.dropped.iter().cloned());
                Ok(())
            }) {
                Ok(stored) => *failed = stored,
                Err(e) => {
                    warn!(error = %e, "Failed to persist failed changes");
                    failed.extend(report.dropped.iter().cloned());
                }
            }
        }

        let record = SyncStatusRecord {
            last_sync: Some(self.clock.now()),
            errors: report.errors.clone(),
        };
        if let Err(e) = self.store.save_status(&record) {
            warn!(error = %e, "Failed to persist sync status");
        }
        *self.lock_last_pass() = record;

        self.pending_tx.send_replace(remaining);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100 / total) as u8
}

/// Format a drain outcome for display.
#[must_use]
pub fn format_drain_outcome(outcome: &DrainOutcome) -> String {
    let report = match outcome {
        DrainOutcome::Skipped { reason } => return format!("Sync skipped: {reason}."),
        DrainOutcome::Completed(report) => report,
    };

    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} changes", report.total));
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} delivered", report.succeeded).green()
        ));
    }

    if report.retried > 0 {
        lines.push(format!(
            "  {} {}",
            "↻".yellow(),
            format!("{} will be retried", report.retried).yellow()
        ));
    }

    if report.deferred > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} deferred", report.deferred).yellow()
        ));
    }

    if !report.dropped.is_empty() {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} failed permanently", report.dropped.len()).red()
        ));
    }

    if report.interrupted {
        lines.push(format!("  {}", "interrupted by shutdown".dimmed()));
    }

    if !report.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in report.errors.iter().take(3) {
            lines.push(format!("  - {err}"));
        }
        if report.errors.len() > 3 {
            lines.push(format!("  ... and {} more", report.errors.len() - 3));
        }
    }

    lines.join("\n")
}
