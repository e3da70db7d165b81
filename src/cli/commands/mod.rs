//! Command implementations for daybook.
//!
//! This module contains the implementation of all CLI commands.

mod queue;
mod sync;

pub use queue::{add, clear, list, retry, status};
pub use sync::{sync, watch};

use crate::cli::args::{Commands, OutputFormat};
use crate::cli::context::{ConnectivityMode, Context};
use crate::error::DaybookError;

/// Connectivity a command needs.
///
/// Only commands that deliver or report reachability touch the network.
#[must_use]
pub const fn connectivity_mode(command: &Commands, offline: bool) -> ConnectivityMode {
    if offline {
        return ConnectivityMode::Offline;
    }
    match command {
        Commands::Watch => ConnectivityMode::Monitor,
        Commands::Status | Commands::Sync => ConnectivityMode::CheckOnce,
        Commands::List { .. } | Commands::Add { .. } | Commands::Retry { .. } | Commands::Clear { .. } => {
            ConnectivityMode::Offline
        }
    }
}

/// Run `command` against an opened context.
///
/// # Errors
///
/// Returns the command's error.
pub async fn run(ctx: &Context, command: Commands, format: OutputFormat) -> Result<String, DaybookError> {
    let engine = &ctx.engine;
    match command {
        Commands::Status => status(engine, format),
        Commands::List { failed } => list(engine, failed, format),
        Commands::Add { kind, domain, payload } => add(engine, &kind, &domain, &payload, format),
        Commands::Sync => sync(engine, format).await,
        Commands::Retry { id } => retry(engine, id.as_deref(), format),
        Commands::Clear { failed, force } => clear(engine, failed, force, format),
        Commands::Watch => watch(ctx, format).await,
    }
}
