//! Configuration management for daybook.
//!
//! This module handles loading configuration from `~/.daybook/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{Config, ConnectivityConfig, LoggingConfig, SyncConfig};
