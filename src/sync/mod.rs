//! Offline change queue and sync engine.
//!
//! Changes made while the backend is unreachable are recorded into a durable
//! queue and replayed in order once connectivity returns.
//!
//! Features:
//! - Durable FIFO queue (survives restarts)
//! - Bounded retries with a dead-letter list for permanent failures
//! - Single-flight drain with per-record ordering
//! - Interval, debounce and reconnect triggers
//! - Typed status events over a broadcast channel

pub mod change;
pub mod client;
pub mod clock;
pub mod connectivity;
pub mod engine;
pub mod events;
pub mod http;
mod recorder;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod synchronizer;

pub use change::{FailedChange, OperationKind, PendingChange, TargetDomain};
pub use client::{ApplyError, DomainApi, DomainRouter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connectivity::{probe_addr, ConnectivitySource, ManualConnectivity, ProbeConnectivity};
pub use engine::{EngineSettings, SyncEngine};
pub use events::{EventBus, SyncEvent};
pub use http::HttpDomainApi;
pub use scheduler::Scheduler;
pub use status::{Connectivity, SyncStatus, SyncStatusRecord};
pub use store::QueueStore;
pub use synchronizer::{format_drain_outcome, DrainOutcome, DrainReport, SkipReason};
