//! Wiring of the engine for one CLI invocation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{Config, Paths};
use crate::error::DaybookError;
use crate::storage::{Database, SqliteStore};
use crate::sync::{
    probe_addr, ConnectivitySource, EngineSettings, HttpDomainApi, ManualConnectivity,
    ProbeConnectivity, SyncEngine,
};

/// How a command learns whether the backend is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// Assume offline; never touch the network.
    Offline,
    /// Probe once at startup.
    CheckOnce,
    /// Keep probing in the background.
    Monitor,
}

/// Engine, configuration and paths shared by the commands.
pub struct Context {
    pub engine: Arc<SyncEngine>,
    pub config: Config,
    pub paths: Paths,
}

impl Context {
    /// Open the queue database under `paths` and build the engine.
    ///
    /// `Monitor` spawns a probe task, so it must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, the stored queue
    /// cannot be read, or the backend URL is invalid.
    pub async fn open(paths: Paths, config: Config, mode: ConnectivityMode) -> Result<Self, DaybookError> {
        let db = Database::open(&paths)?;
        let kv = Arc::new(SqliteStore::new(db));

        let connectivity: Arc<dyn ConnectivitySource> = match mode {
            ConnectivityMode::Offline => Arc::new(ManualConnectivity::new(false)),
            ConnectivityMode::CheckOnce => {
                let addr = probe_addr(&config.sync.api_base_url)?;
                let online = ProbeConnectivity::check(&addr, &config.connectivity).await;
                debug!(addr = %addr, online, "Probed backend");
                Arc::new(ManualConnectivity::new(online))
            }
            ConnectivityMode::Monitor => {
                let addr = probe_addr(&config.sync.api_base_url)?;
                Arc::new(ProbeConnectivity::spawn(addr, &config.connectivity))
            }
        };

        let router = HttpDomainApi::router(&config.sync.api_base_url, config.sync.request_timeout())?;
        let engine = SyncEngine::open(kv, connectivity, router, EngineSettings::from(&config.sync))?;

        info!(
            database = %paths.database.display(),
            ?mode,
            "Opened sync engine"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config,
            paths,
        })
    }
}
