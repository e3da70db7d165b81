use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::sync::{Connectivity, FailedChange, PendingChange, SyncEvent, SyncStatus, TargetDomain};

/// Longest error or payload text shown on one line.
const MAX_INLINE: usize = 50;

/// Format the sync status as a pretty summary
pub fn format_status_pretty(status: &SyncStatus, failures: &BTreeMap<TargetDomain, usize>) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Status".bold().to_string());
    lines.push("─".repeat(40));

    let connectivity = match status.connectivity {
        Connectivity::Online => "● online".green(),
        Connectivity::Offline => "○ offline".yellow(),
    };
    lines.push(format!("  Backend:    {connectivity}"));

    let last_sync = status
        .last_successful_sync
        .map_or_else(|| "never".to_string(), |at| relative_age(at, Utc::now()));
    lines.push(format!("  Last sync:  {}", last_sync.dimmed()));

    if status.in_progress {
        lines.push(format!(
            "  Progress:   {}",
            format!("{}%", status.progress_percent).cyan()
        ));
    }

    lines.push(format!(
        "  Pending:    {} {}",
        status.pending_count,
        if status.pending_count > 0 {
            "changes waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));

    lines.push(format!(
        "  Failed:     {} {}",
        status.failed_count,
        if status.failed_count > 0 {
            "changes need attention".red()
        } else {
            "".normal()
        }
    ));

    for (domain, count) in failures {
        lines.push(format!("    {:<16} {}", domain.display_name(), count));
    }

    if !status.errors.is_empty() {
        lines.push(String::new());
        lines.push("Last sync errors:".to_string());
        for err in &status.errors {
            lines.push(format!("  - {}", err.red()));
        }
    }

    if status.pending_count > 0 && status.connectivity == Connectivity::Online {
        lines.push(String::new());
        lines.push(
            "Run 'daybook sync' to send pending changes"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format pending changes as a table
pub fn format_pending_pretty(changes: &[PendingChange]) -> String {
    if changes.is_empty() {
        return "No pending changes.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Pending Changes ({})", changes.len()));
    lines.push("─".repeat(60));
    lines.push(format!(
        "{:<8} {:<16} {:<18} {}",
        "Type", "Domain", "Recorded", "Retries"
    ));
    lines.push("─".repeat(60));

    for change in changes {
        let retries = if change.retry_count > 0 {
            change.retry_count.to_string().yellow()
        } else {
            "0".normal()
        };
        lines.push(format!(
            "{:<8} {:<16} {:<18} {}",
            change.operation_kind.as_str(),
            change.target_domain.display_name(),
            change.enqueued_at.format("%Y-%m-%d %H:%M"),
            retries
        ));
        lines.push(format!("         {}", shorten(&change.payload.to_string()).dimmed()));
    }

    lines.join("\n")
}

/// Format permanently failed changes as a table
pub fn format_failed_pretty(failed: &[FailedChange]) -> String {
    if failed.is_empty() {
        return "No failed changes.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Failed Changes ({})", failed.len()));
    lines.push("─".repeat(60));

    for entry in failed {
        lines.push(format!(
            "{} {}  {}",
            "✗".red(),
            entry.change.describe().bold(),
            entry.failed_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
        lines.push(format!("  {}", shorten(&entry.error).red()));
    }

    lines.push(String::new());
    lines.push(
        "Run 'daybook retry' to queue them again"
            .dimmed()
            .to_string(),
    );

    lines.join("\n")
}

/// Confirmation line for a recorded change
pub fn format_enqueued_pretty(change: &PendingChange, pending: usize) -> String {
    format!(
        "{} Queued {} {}",
        "✓".green(),
        change.describe().bold(),
        format!("({pending} pending)").dimmed()
    )
}

/// One line per status event, for `watch`
pub fn format_event_pretty(event: &SyncEvent) -> String {
    let time = Utc::now().format("%H:%M:%S").to_string().dimmed();
    let text = match event {
        SyncEvent::ConnectivityOnline => "backend online".green().to_string(),
        SyncEvent::ConnectivityOffline => "backend offline".yellow().to_string(),
        SyncEvent::SyncStarted => "sync started".to_string(),
        SyncEvent::SyncProgress { percent } => format!("sync {percent}%"),
        SyncEvent::SyncCompleted { success_count } => {
            format!("sync completed: {success_count} delivered")
                .green()
                .to_string()
        }
        SyncEvent::SyncPartialFailure { error_count } => {
            format!("{error_count} changes failed permanently")
                .red()
                .to_string()
        }
    };
    format!("{time} {text}")
}

/// Human-readable age of `at` relative to `now`
pub fn relative_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn shorten(text: &str) -> String {
    if text.chars().count() > MAX_INLINE {
        let head: String = text.chars().take(MAX_INLINE - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::OperationKind;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn make_status(pending: usize, failed: usize) -> SyncStatus {
        SyncStatus {
            connectivity: Connectivity::Online,
            last_successful_sync: None,
            in_progress: false,
            progress_percent: 0,
            errors: vec![],
            pending_count: pending,
            failed_count: failed,
        }
    }

    #[test]
    fn test_format_status_pretty() {
        let failures = BTreeMap::from([(TargetDomain::CalendarEvent, 2)]);
        let output = format_status_pretty(&make_status(3, 2), &failures);

        assert!(output.contains("Sync Status"));
        assert!(output.contains("never"));
        assert!(output.contains("changes waiting"));
        assert!(output.contains("Calendar Event"));
        assert!(output.contains("daybook sync"));
    }

    #[test]
    fn test_format_status_pretty_errors() {
        let mut status = make_status(0, 0);
        status.errors = vec!["create task: HTTP 422 (after 1 attempt)".to_string()];
        let output = format_status_pretty(&status, &BTreeMap::new());

        assert!(output.contains("Last sync errors:"));
        assert!(output.contains("HTTP 422"));
    }

    #[test]
    fn test_format_pending_pretty() {
        assert_eq!(format_pending_pretty(&[]), "No pending changes.");

        let change = PendingChange::new(
            OperationKind::Update,
            TargetDomain::Habit,
            json!({"id": "h-1", "notes": "a".repeat(80)}),
            Utc.with_ymd_and_hms(2024, 12, 15, 9, 30, 0).unwrap(),
        );
        let output = format_pending_pretty(&[change]);

        assert!(output.contains("Pending Changes (1)"));
        assert!(output.contains("update"));
        assert!(output.contains("2024-12-15 09:30"));
        assert!(output.contains("..."));
    }

    #[test]
    fn test_format_failed_pretty() {
        assert_eq!(format_failed_pretty(&[]), "No failed changes.");

        let failed = FailedChange {
            change: PendingChange::new(
                OperationKind::Delete,
                TargetDomain::Journal,
                json!({"id": "j-3"}),
                Utc::now(),
            ),
            error: "HTTP 404 Not Found".to_string(),
            failed_at: Utc::now(),
        };
        let output = format_failed_pretty(&[failed]);

        assert!(output.contains("delete journal j-3"));
        assert!(output.contains("HTTP 404"));
    }

    #[test]
    fn test_relative_age() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 12, 0, 0).unwrap();
        assert_eq!(relative_age(now, now), "just now");
        assert_eq!(relative_age(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(relative_age(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_age(now - Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_format_event_pretty() {
        let line = format_event_pretty(&SyncEvent::SyncCompleted { success_count: 4 });
        assert!(line.contains("sync completed: 4 delivered"));
    }
}
