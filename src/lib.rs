//! daybook - offline change queue and sync engine
//!
//! This crate records changes made in a personal productivity dashboard
//! (tasks, habits, moods, journal entries, calendar events) into a durable
//! queue and replays them against the backend once it is reachable.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::DaybookError;
pub use sync::SyncEngine;
