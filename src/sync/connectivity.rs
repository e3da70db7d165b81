//! Connectivity sources.
//!
//! The engine only asks two things of connectivity: the current state and a
//! way to observe transitions. Both are served by a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ConnectivityConfig;
use crate::error::DaybookError;

/// Reports backend reachability and its transitions.
pub trait ConnectivitySource: Send + Sync {
    /// Whether the backend is currently reachable.
    fn is_online(&self) -> bool;

    /// Receiver that observes every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity flipped by hand (tests, `--offline`).
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Set the state; subscribers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Connectivity derived from periodic TCP connects to the backend host.
///
/// Must be created inside a tokio runtime. The probe task stops on drop.
pub struct ProbeConnectivity {
    tx: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl ProbeConnectivity {
    /// Start probing `addr` (`host:port`). Starts offline until the first probe answers.
    #[must_use]
    pub fn spawn(addr: String, config: &ConnectivityConfig) -> Self {
        let (tx, _) = watch::channel(false);
        let tx = Arc::new(tx);
        let interval = Duration::from_secs(config.probe_interval_secs.max(1));
        let timeout = Duration::from_millis(config.probe_timeout_ms);

        let probe_tx = Arc::clone(&tx);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = probe(&addr, timeout).await;
                probe_tx.send_if_modified(|current| {
                    if *current == online {
                        return false;
                    }
                    info!(addr = %addr, online, "Backend reachability changed");
                    *current = online;
                    true
                });
            }
        });

        Self { tx, task }
    }

    /// Probe once, right now, and return the result without publishing it.
    pub async fn check(addr: &str, config: &ConnectivityConfig) -> bool {
        probe(addr, Duration::from_millis(config.probe_timeout_ms)).await
    }
}

impl ConnectivitySource for ProbeConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for ProbeConnectivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn probe(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(addr, error = %e, "Probe failed");
            false
        }
        Err(_) => {
            debug!(addr, "Probe timed out");
            false
        }
    }
}

/// Derive the `host:port` to probe from the backend base URL.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed or has no host.
pub fn probe_addr(base_url: &str) -> Result<String, DaybookError> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| DaybookError::Config(format!("Invalid api_base_url {base_url}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| DaybookError::Config(format!("api_base_url {base_url} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| DaybookError::Config(format!("api_base_url {base_url} has no port")))?;

    Ok(format!("{host}:{port}"))
}
