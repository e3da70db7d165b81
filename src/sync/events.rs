//! Status events published for the dashboard's notification layer.

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers miss the oldest events.
const EVENT_CAPACITY: usize = 64;

/// Discrete event describing engine progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// Backend became reachable
    ConnectivityOnline,
    /// Backend became unreachable
    ConnectivityOffline,
    /// A drain pass started
    SyncStarted,
    /// Share of the pass snapshot processed so far
    SyncProgress { percent: u8 },
    /// A drain pass finished
    SyncCompleted { success_count: usize },
    /// A drain pass dropped changes permanently
    SyncPartialFailure { error_count: usize },
}

impl SyncEvent {
    /// Kebab-case event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectivityOnline => "connectivity-online",
            Self::ConnectivityOffline => "connectivity-offline",
            Self::SyncStarted => "sync-started",
            Self::SyncProgress { .. } => "sync-progress",
            Self::SyncCompleted { .. } => "sync-completed",
            Self::SyncPartialFailure { .. } => "sync-partial-failure",
        }
    }
}

/// Fan-out of [`SyncEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => tracing::trace!(event = name, receivers, "Emitted sync event"),
            Err(_) => tracing::trace!(event = name, "No subscribers for sync event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
