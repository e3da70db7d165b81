//! Sync status reported to the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Backend reachable
    Online,
    /// Backend unreachable; changes are only recorded locally
    Offline,
}

impl Connectivity {
    /// Map a boolean reachability flag.
    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// Snapshot of the engine's sync state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub connectivity: Connectivity,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub progress_percent: u8,
    /// Terminal errors from the most recent pass, in order.
    pub errors: Vec<String>,
    pub pending_count: usize,
    pub failed_count: usize,
}

/// Persisted sync metadata: `{lastSync, errors}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusRecord {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<String>,
}
