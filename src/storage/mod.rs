//! Storage layer for daybook.
//!
//! SQLite-backed persistence for the offline change queue, behind a small
//! key/value interface so the engine can also run on an in-memory store.

mod database;
mod kv;
mod migrations;

pub use database::Database;
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
