//! Pending change types for the offline queue.
//!
//! A pending change is one recorded user intent (create/update/delete of a
//! dashboard item) that has not been confirmed by the backend yet.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DaybookError;

/// Kind of mutation a change performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create a new item
    Create,
    /// Update an existing item
    Update,
    /// Delete an existing item
    Delete,
}

impl OperationKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Delete];

    /// Stable lowercase name, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "add" => Ok(Self::Create),
            "update" | "edit" => Ok(Self::Update),
            "delete" | "remove" => Ok(Self::Delete),
            other => Err(DaybookError::UnknownOperation(other.to_string())),
        }
    }
}

/// Dashboard domain a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetDomain {
    /// To-do items
    Task,
    /// Recurring habits and their completions
    Habit,
    /// Mood check-ins
    Mood,
    /// Journal entries
    Journal,
    /// Calendar events
    CalendarEvent,
}

impl TargetDomain {
    /// All domains, in display order.
    pub const ALL: [Self; 5] = [
        Self::Task,
        Self::Habit,
        Self::Mood,
        Self::Journal,
        Self::CalendarEvent,
    ];

    /// Stable name, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Habit => "habit",
            Self::Mood => "mood",
            Self::Journal => "journal",
            Self::CalendarEvent => "calendar-event",
        }
    }

    /// Get the display name for this domain.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Habit => "Habit",
            Self::Mood => "Mood",
            Self::Journal => "Journal",
            Self::CalendarEvent => "Calendar Event",
        }
    }
}

impl std::fmt::Display for TargetDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetDomain {
    type Err = DaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "task" | "todo" => Ok(Self::Task),
            "habit" => Ok(Self::Habit),
            "mood" => Ok(Self::Mood),
            "journal" => Ok(Self::Journal),
            "calendar-event" | "calendarevent" | "event" => Ok(Self::CalendarEvent),
            other => Err(DaybookError::UnknownDomain(other.to_string())),
        }
    }
}

/// A recorded change awaiting delivery to the backend.
///
/// Field names on disk follow the persisted layout:
/// `{id, type, entity, data, timestamp, retryCount}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Unique ID, assigned at enqueue time
    pub id: String,
    /// Create, update or delete
    #[serde(rename = "type")]
    pub operation_kind: OperationKind,
    /// Which domain API receives the change
    #[serde(rename = "entity")]
    pub target_domain: TargetDomain,
    /// Domain-specific payload
    #[serde(rename = "data")]
    pub payload: Value,
    /// When the change was recorded
    #[serde(rename = "timestamp")]
    pub enqueued_at: DateTime<Utc>,
    /// Failed remote attempts so far
    #[serde(rename = "retryCount", default)]
    pub retry_count: u32,
}

impl PendingChange {
    /// Create a new change with a fresh ID and no attempts.
    #[must_use]
    pub fn new(
        operation_kind: OperationKind,
        target_domain: TargetDomain,
        payload: Value,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation_kind,
            target_domain,
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    /// ID of the record this change targets, taken from the payload's `id`.
    ///
    /// Creates usually have no ID yet and return `None`.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        match self.payload.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Key identifying the targeted record across domains.
    #[must_use]
    pub fn record_key(&self) -> Option<(TargetDomain, String)> {
        self.record_id().map(|id| (self.target_domain, id))
    }

    /// Short human-readable label, e.g. `update habit h-42`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.record_id() {
            Some(id) => format!("{} {} {id}", self.operation_kind, self.target_domain),
            None => format!("{} {}", self.operation_kind, self.target_domain),
        }
    }
}

/// A change that exhausted its retry budget or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedChange {
    /// The dropped change, with its final retry count
    pub change: PendingChange,
    /// Last error reported by the backend
    pub error: String,
    /// When it was dropped
    pub failed_at: DateTime<Utc>,
}
