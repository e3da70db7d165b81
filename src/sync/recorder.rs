//! Change recorder: appends user intents to the queue.
//!
//! A change is only accepted once it is durably stored. The append goes onto
//! the stored queue, so changes recorded by another process sharing the
//! database are kept. If the write fails nothing is queued and the caller
//! gets the error.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use super::change::{OperationKind, PendingChange, TargetDomain};
use super::engine::SyncEngine;
use crate::error::DaybookError;

impl SyncEngine {
    /// Record a change for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` cannot be serialized or the queue cannot
    /// be persisted. The change is not queued in either case.
    pub fn enqueue<P: Serialize + ?Sized>(
        &self,
        operation_kind: OperationKind,
        target_domain: TargetDomain,
        payload: &P,
    ) -> Result<PendingChange, DaybookError> {
        let payload = serde_json::to_value(payload)?;
        self.record(PendingChange::new(
            operation_kind,
            target_domain,
            payload,
            self.clock.now(),
        ))
    }

    /// Record a change from untyped names, e.g. CLI input.
    ///
    /// # Errors
    ///
    /// Returns [`DaybookError::UnknownOperation`] or
    /// [`DaybookError::UnknownDomain`] for unrecognized names, or the errors
    /// of [`SyncEngine::enqueue`].
    pub fn enqueue_named(
        &self,
        operation_kind: &str,
        target_domain: &str,
        payload: Value,
    ) -> Result<PendingChange, DaybookError> {
        let operation_kind: OperationKind = operation_kind.parse()?;
        let target_domain: TargetDomain = target_domain.parse()?;
        self.record(PendingChange::new(
            operation_kind,
            target_domain,
            payload,
            self.clock.now(),
        ))
    }

    fn record(&self, change: PendingChange) -> Result<PendingChange, DaybookError> {
        let mut queue = self.lock_queue();
        let written = self.store.modify_queue(|stored| {
            if stored.iter().any(|c| c.id == change.id) {
                return Err(DaybookError::Storage(format!(
                    "change {} is already queued",
                    change.id
                )));
            }
            stored.push(change.clone());
            Ok(())
        });

        let len = match written {
            Ok(stored) => {
                *queue = stored;
                queue.len()
            }
            Err(e) => {
                error!(change = %change.describe(), error = %e, "Rejected change: queue not persisted");
                return Err(e);
            }
        };
        drop(queue);

        debug!(id = %change.id, change = %change.describe(), pending = len, "Recorded change");
        self.pending_tx.send_replace(len);
        self.enqueue_signal.notify_one();
        Ok(change)
    }
}
