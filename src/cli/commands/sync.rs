//! Delivery commands.
//!
//! `sync` runs a single drain pass; `watch` keeps the scheduler running and
//! streams status events until interrupted.

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cli::args::OutputFormat;
use crate::cli::context::Context;
use crate::error::DaybookError;
use crate::output::{format_drain, format_event_pretty, format_status, to_json};
use crate::sync::{Scheduler, SyncEngine};

/// Send pending changes now.
///
/// # Errors
///
/// Returns an error if output formatting fails. Delivery failures are part
/// of the report, not errors.
pub async fn sync(engine: &SyncEngine, format: OutputFormat) -> Result<String, DaybookError> {
    let outcome = engine.drain().await;
    format_drain(&outcome, format)
}

/// Run the scheduler until Ctrl-C, printing each status event.
///
/// # Errors
///
/// Returns an error if waiting for Ctrl-C fails or output formatting fails.
pub async fn watch(ctx: &Context, format: OutputFormat) -> Result<String, DaybookError> {
    let engine = &ctx.engine;
    let mut events = engine.subscribe();
    let scheduler = Scheduler::start(std::sync::Arc::clone(engine), &ctx.config.sync);

    if format == OutputFormat::Pretty {
        println!(
            "{} {} pending; press Ctrl-C to stop",
            "Watching".bold(),
            engine.pending_count()
        );
    }

    let interrupted = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal,
            received = events.recv() => match received {
                Ok(event) => {
                    let line = match format {
                        OutputFormat::Pretty => format_event_pretty(&event),
                        OutputFormat::Json => serde_json::to_string(&event)?,
                    };
                    println!("{line}");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Status events dropped"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    scheduler.shutdown(engine).await;
    interrupted?;

    match format {
        OutputFormat::Json => to_json(&engine.status()),
        OutputFormat::Pretty => format_status(&engine.status(), &engine.failure_summary(), format),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::storage::MemoryStore;
    use crate::sync::{
        ApplyError, DomainApi, DomainRouter, EngineSettings, ManualConnectivity, OperationKind,
        TargetDomain,
    };

    struct AcceptAll;

    #[async_trait]
    impl DomainApi for AcceptAll {
        async fn create(&self, _payload: &Value) -> Result<(), ApplyError> {
            Ok(())
        }

        async fn update(&self, _payload: &Value) -> Result<(), ApplyError> {
            Ok(())
        }

        async fn delete(&self, _payload: &Value) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    fn engine(online: bool) -> SyncEngine {
        SyncEngine::open(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualConnectivity::new(online)),
            DomainRouter::new().with_all(Arc::new(AcceptAll)),
            EngineSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_offline_is_skipped() {
        let engine = engine(false);
        engine
            .enqueue(OperationKind::Create, TargetDomain::Task, &json!({"title": "x"}))
            .unwrap();

        let out = sync(&engine, OutputFormat::Json).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["outcome"], "skipped");
        assert_eq!(value["reason"], "offline");
    }

    #[tokio::test]
    async fn test_sync_online_reports_delivery() {
        let engine = engine(true);
        engine
            .enqueue(OperationKind::Update, TargetDomain::Task, &json!({"id": "t-1"}))
            .unwrap();

        let out = sync(&engine, OutputFormat::Json).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["succeeded"], 1);
        assert_eq!(engine.pending_count(), 0);
    }
}
