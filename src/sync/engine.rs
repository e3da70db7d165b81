//! The sync engine instance.
//!
//! One [`SyncEngine`] owns the in-memory queue and everything it needs:
//! store, connectivity source, domain router, clock and event bus. It is
//! built once, wrapped in an `Arc` and shared with the scheduler and the UI.
//! Recording lives in `recorder.rs`, draining in `synchronizer.rs`.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tracing::{info, warn};

use super::change::{FailedChange, PendingChange, TargetDomain};
use super::client::DomainRouter;
use super::clock::{Clock, SystemClock};
use super::connectivity::ConnectivitySource;
use super::events::{EventBus, SyncEvent};
use super::status::{Connectivity, SyncStatus, SyncStatusRecord};
use super::store::QueueStore;
use crate::config::SyncConfig;
use crate::error::DaybookError;
use crate::storage::KeyValueStore;

/// Tunables the engine itself reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Failed attempts after which a change is dropped
    pub max_retries: u32,
    /// Timeout for one remote call
    pub request_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Offline change queue and synchronizer.
pub struct SyncEngine {
    pub(super) store: QueueStore,
    pub(super) connectivity: Arc<dyn ConnectivitySource>,
    pub(super) router: DomainRouter,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: EngineSettings,
    pub(super) events: EventBus,
    pub(super) queue: Mutex<Vec<PendingChange>>,
    pub(super) failed: Mutex<Vec<FailedChange>>,
    pub(super) last_pass: Mutex<SyncStatusRecord>,
    pub(super) in_flight: AtomicBool,
    pub(super) progress: AtomicU8,
    pub(super) shutting_down: AtomicBool,
    pub(super) pending_tx: watch::Sender<usize>,
    pub(super) enqueue_signal: Notify,
}

impl SyncEngine {
    /// Build an engine, restoring the queue and sync metadata from `kv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. Malformed entries are
    /// skipped, not reported.
    pub fn open(
        kv: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivitySource>,
        router: DomainRouter,
        settings: EngineSettings,
    ) -> Result<Self, DaybookError> {
        Self::open_with_clock(kv, connectivity, router, settings, Arc::new(SystemClock))
    }

    /// Like [`SyncEngine::open`], with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn open_with_clock(
        kv: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivitySource>,
        router: DomainRouter,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DaybookError> {
        let store = QueueStore::new(kv);
        let queue = store.load_queue()?;
        let failed = store.load_failed()?;
        let last_pass = store.load_status()?;

        info!(
            pending = queue.len(),
            failed = failed.len(),
            "Restored offline change queue"
        );

        let (pending_tx, _) = watch::channel(queue.len());

        Ok(Self {
            store,
            connectivity,
            router,
            clock,
            settings,
            events: EventBus::new(),
            queue: Mutex::new(queue),
            failed: Mutex::new(failed),
            last_pass: Mutex::new(last_pass),
            in_flight: AtomicBool::new(false),
            progress: AtomicU8::new(0),
            shutting_down: AtomicBool::new(false),
            pending_tx,
            enqueue_signal: Notify::new(),
        })
    }

    /// Subscribe to status events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Observe the number of pending changes.
    #[must_use]
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }

    /// Number of changes waiting for delivery.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_queue().len()
    }

    /// Copy of the pending queue in delivery order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingChange> {
        self.lock_queue().clone()
    }

    /// Copy of the permanently failed changes, oldest failure first.
    #[must_use]
    pub fn failed(&self) -> Vec<FailedChange> {
        self.lock_failed().clone()
    }

    /// Permanently failed changes per domain.
    #[must_use]
    pub fn failure_summary(&self) -> BTreeMap<TargetDomain, usize> {
        let mut summary = BTreeMap::new();
        for failed in self.lock_failed().iter() {
            *summary.entry(failed.change.target_domain).or_insert(0) += 1;
        }
        summary
    }

    /// Whether a drain pass is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the backend is reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Snapshot of the current sync state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let last_pass = self.lock_last_pass().clone();
        SyncStatus {
            connectivity: Connectivity::from_online(self.connectivity.is_online()),
            last_successful_sync: last_pass.last_sync,
            in_progress: self.is_draining(),
            progress_percent: self.progress.load(Ordering::Relaxed),
            errors: last_pass.errors,
            pending_count: self.pending_count(),
            failed_count: self.lock_failed().len(),
        }
    }

    /// Re-read the queue and the failed changes from the store.
    ///
    /// Another process sharing the database (a one-shot `daybook add` next to
    /// `daybook watch`) may have changed both. Returns the pending count. If
    /// the store cannot be read the cached copies stay in place.
    pub fn refresh(&self) -> usize {
        let len = {
            let mut queue = self.lock_queue();
            match self.store.load_queue() {
                Ok(stored) => *queue = stored,
                Err(e) => warn!(error = %e, "Failed to re-read queue; using cached copy"),
            }
            queue.len()
        };

        match self.store.load_failed() {
            Ok(stored) => *self.lock_failed() = stored,
            Err(e) => warn!(error = %e, "Failed to re-read failed changes; using cached copy"),
        }

        self.pending_tx.send_if_modified(|count| {
            let changed = *count != len;
            *count = len;
            changed
        });
        len
    }

    /// Move every permanently failed change back into the queue with a
    /// zeroed retry count, in enqueue order, and nudge a drain.
    ///
    /// Returns the number of re-queued changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be persisted; nothing moves then.
    pub fn retry_failed(&self) -> Result<usize, DaybookError> {
        self.requeue_where(|_| true)
    }

    /// Like [`SyncEngine::retry_failed`], for the single failed change `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DaybookError::NotFound`] if no failed change has that ID, or
    /// an error if the queue cannot be persisted.
    pub fn retry_failed_change(&self, id: &str) -> Result<(), DaybookError> {
        if self.requeue_where(|f| f.change.id == id)? == 0 {
            return Err(DaybookError::NotFound(format!("failed change {id}")));
        }
        Ok(())
    }

    fn requeue_where(&self, select: impl Fn(&FailedChange) -> bool) -> Result<usize, DaybookError> {
        let mut failed = self.lock_failed();
        let chosen: Vec<FailedChange> = self
            .store
            .load_failed()?
            .into_iter()
            .filter(|f| select(f))
            .collect();
        if chosen.is_empty() {
            return Ok(0);
        }
        let count = chosen.len();
        let ids: HashSet<String> = chosen.iter().map(|f| f.change.id.clone()).collect();

        let mut queue = self.lock_queue();
        *queue = self.store.modify_queue(|stored| {
            let mut restored: Vec<PendingChange> = chosen
                .into_iter()
                .filter(|f| !stored.iter().any(|c| c.id == f.change.id))
                .map(|f| PendingChange {
                    retry_count: 0,
                    ..f.change
                })
                .collect();
            restored.sort_by_key(|c| c.enqueued_at);

            // Restored changes slot in by enqueue time; queued ones keep their order.
            for change in restored {
                let at = stored
                    .iter()
                    .position(|c| c.enqueued_at > change.enqueued_at)
                    .unwrap_or(stored.len());
                stored.insert(at, change);
            }
            Ok(())
        })?;

        match self
            .store
            .modify_failed(|stored| {
                stored.retain(|f| !ids.contains(&f.change.id));
                Ok(())
            }) {
            Ok(stored) => *failed = stored,
            Err(e) => {
                // Re-queued IDs are filtered on the next retry, so a stale list is harmless.
                warn!(error = %e, "Failed to persist failure list");
                failed.retain(|f| !ids.contains(&f.change.id));
            }
        }

        let len = queue.len();
        drop(queue);
        drop(failed);

        info!(count, "Re-queued failed changes");
        self.pending_tx.send_replace(len);
        self.enqueue_signal.notify_one();
        Ok(count)
    }

    /// Forget all permanently failed changes. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored list cannot be removed.
    pub fn clear_failed(&self) -> Result<usize, DaybookError> {
        let mut failed = self.lock_failed();
        let count = self.store.load_failed()?.len();
        self.store.clear_failed()?;
        failed.clear();
        Ok(count)
    }

    /// Discard every pending change without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored queue cannot be removed.
    pub fn discard_pending(&self) -> Result<usize, DaybookError> {
        let mut queue = self.lock_queue();
        let count = self.store.load_queue()?.len();
        self.store.clear_queue()?;
        queue.clear();
        drop(queue);

        warn!(count, "Discarded pending changes");
        self.pending_tx.send_replace(0);
        Ok(count)
    }

    /// Stop accepting drains. A running pass stops before its next entry.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Whether [`SyncEngine::shutdown`] was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub(super) fn connectivity_source(&self) -> &Arc<dyn ConnectivitySource> {
        &self.connectivity
    }

    pub(super) fn lock_queue(&self) -> MutexGuard<'_, Vec<PendingChange>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_failed(&self) -> MutexGuard<'_, Vec<FailedChange>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_last_pass(&self) -> MutexGuard<'_, SyncStatusRecord> {
        self.last_pass.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
