use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::HOME_ENV;

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Offline change queue and sync engine for your productivity dashboard")]
#[command(long_about = "daybook - offline change queue for the productivity dashboard

Changes to tasks, habits, moods, journal entries and calendar events are
recorded locally first and delivered to the backend in order once it is
reachable. Failed deliveries are retried a bounded number of times, then
kept aside for inspection.

QUICK START:
  daybook add create task '{\"title\": \"Buy milk\"}'   Record a change
  daybook status                                       Show queue and sync state
  daybook sync                                         Send pending changes now
  daybook watch                                        Keep syncing in the background

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  daybook <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output (default),
    /// or 'json' for machine-readable output suitable for scripting.
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Data directory holding config.yaml, the queue database and logs
    ///
    /// Defaults to ~/.daybook.
    #[arg(long, env = HOME_ENV, global = true)]
    pub home: Option<PathBuf>,

    /// Treat the backend as unreachable
    ///
    /// Changes are only recorded; nothing is sent.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show connectivity, queue size and the last sync result
    #[command(alias = "st")]
    Status,

    /// List queued changes
    ///
    /// Shows pending changes in delivery order, or with --failed the
    /// changes that were dropped after exhausting their retries.
    #[command(alias = "ls")]
    List {
        /// Show permanently failed changes instead
        #[arg(long)]
        failed: bool,
    },

    /// Record a change for delivery
    ///
    /// # Examples
    ///
    ///   daybook add create task '{"title": "Buy milk"}'
    ///   daybook add update habit '{"id": "h-42", "streak": 5}'
    ///   daybook add delete calendar-event '{"id": "ev-7"}'
    #[command(alias = "a")]
    Add {
        /// Operation: create, update or delete
        kind: String,

        /// Domain: task, habit, mood, journal or calendar-event
        domain: String,

        /// Payload as a JSON object
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Send pending changes now
    Sync,

    /// Move permanently failed changes back into the queue
    ///
    /// Re-queues every failed change, or only the one with the given ID
    /// (see `daybook list --failed --output json`).
    Retry {
        /// ID of a single failed change
        id: Option<String>,
    },

    /// Remove changes from the queue
    ///
    /// Without --failed this discards pending changes that were never sent,
    /// which needs --force.
    Clear {
        /// Clear the permanently failed list instead
        #[arg(long)]
        failed: bool,

        /// Confirm discarding pending changes
        #[arg(long)]
        force: bool,
    },

    /// Run the scheduler and print status events until Ctrl-C
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::parse_from(["daybook", "add", "update", "habit", r#"{"id":"h-1"}"#]);
        match cli.command {
            Commands::Add { kind, domain, payload } => {
                assert_eq!(kind, "update");
                assert_eq!(domain, "habit");
                assert_eq!(payload, r#"{"id":"h-1"}"#);
            }
            _ => panic!("expected add"),
        }
        assert_eq!(cli.output, OutputFormat::Pretty);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["daybook", "status", "--output", "json", "--offline", "--home", "/tmp/db"]);
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.offline);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/db")));
    }

    #[test]
    fn test_add_payload_defaults_to_empty_object() {
        let cli = Cli::parse_from(["daybook", "add", "create", "mood"]);
        assert!(matches!(cli.command, Commands::Add { payload, .. } if payload == "{}"));
    }

    #[test]
    fn test_retry_optional_id() {
        let cli = Cli::parse_from(["daybook", "retry"]);
        assert!(matches!(cli.command, Commands::Retry { id: None }));
        let cli = Cli::parse_from(["daybook", "retry", "c-1"]);
        assert!(matches!(cli.command, Commands::Retry { id: Some(ref id) } if id == "c-1"));
    }

    #[test]
    fn test_clear_flags() {
        let cli = Cli::parse_from(["daybook", "clear", "--failed"]);
        assert!(matches!(cli.command, Commands::Clear { failed: true, force: false }));
    }
}
