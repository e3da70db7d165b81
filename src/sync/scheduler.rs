//! Drain triggers.
//!
//! One background task waits on three sources and runs a drain for each:
//! - the periodic interval, when the queue is non-empty
//! - the enqueue debounce, once no change has been recorded for a quiet period
//! - connectivity coming back online
//!
//! Offline transitions only emit an event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::SyncEngine;
use super::events::SyncEvent;
use super::synchronizer::DrainOutcome;
use crate::config::SyncConfig;

/// Background task driving drains for one engine.
pub struct Scheduler {
    stop: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the trigger loop. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(engine: Arc<SyncEngine>, config: &SyncConfig) -> Self {
        let stop = Arc::new(Notify::new());
        let interval = config.interval();
        let debounce = config.debounce();

        info!(
            interval_secs = interval.as_secs(),
            debounce_ms = debounce.as_millis(),
            "Sync scheduler started"
        );
        let task = tokio::spawn(run(engine, Arc::clone(&stop), interval, debounce));

        Self {
            stop,
            task: Some(task),
        }
    }

    /// Stop the engine, let a running pass finish its current entry, then
    /// wait for the loop to exit.
    pub async fn shutdown(mut self, engine: &SyncEngine) {
        engine.shutdown();
        self.stop.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Sync scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(engine: Arc<SyncEngine>, stop: Arc<Notify>, interval: Duration, debounce: Duration) {
    let mut connectivity = engine.connectivity_source().subscribe();
    let mut connectivity_open = true;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut deadline: Option<Instant> = None;

    loop {
        let quiet_until = deadline;
        let quiet = async move {
            match quiet_until {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = stop.notified() => break,
            _ = ticker.tick() => {
                // Picks up changes another process recorded in the same store.
                if engine.refresh() > 0 {
                    trigger(&engine, "interval").await;
                }
            }
            () = engine.enqueue_signal.notified() => {
                deadline = Some(Instant::now() + debounce);
            }
            () = quiet => {
                deadline = None;
                trigger(&engine, "debounce").await;
            }
            changed = connectivity.changed(), if connectivity_open => {
                if changed.is_err() {
                    debug!("Connectivity source closed");
                    connectivity_open = false;
                    continue;
                }
                let online = *connectivity.borrow_and_update();
                if online {
                    info!("Back online");
                    engine.events.emit(SyncEvent::ConnectivityOnline);
                    trigger(&engine, "reconnect").await;
                } else {
                    info!("Gone offline");
                    engine.events.emit(SyncEvent::ConnectivityOffline);
                }
            }
        }

        if engine.is_shut_down() {
            break;
        }
    }
}

async fn trigger(engine: &SyncEngine, source: &'static str) {
    match engine.drain().await {
        DrainOutcome::Skipped { reason } => debug!(source, %reason, "Drain skipped"),
        DrainOutcome::Completed(report) => debug!(
            source,
            succeeded = report.succeeded,
            remaining = engine.pending_count(),
            "Drain completed"
        ),
    }
}
