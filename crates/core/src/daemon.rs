//! Top-level process wiring: Store + SourceSupervisor + WorkerPool + the
//! ambient status HTTP server.
//!
//! Grounded on the teacher's `daemon.rs` (`Daemon::new`,
//! `create_required_directories`, `run_with_server`), rewired from an
//! encode-job-queue-plus-metrics-server shape onto
//! Store/SourceSupervisor/WorkerPool.

use crate::error::DaemonError;
use crate::status::StatusFacade;
use crate::status_server;
use crate::store::{Store, Worker, WorkerStatus};
use crate::supervisor::SourceSupervisor;
use crate::worker_pool::{self, WorkerHandle};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use xdtranscode_config::Config;

const DEFAULT_CONFIG_PATH: &str = "xdtranscode.toml";

/// Ensures the parent directory of the database path exists before the
/// Store attempts to open it.
fn create_required_directories(config: &Config) -> Result<(), DaemonError> {
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Initializes the global `tracing` subscriber from `config.logging.level`.
/// Safe to call more than once; a second init attempt is silently ignored.
pub fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct Daemon {
    config: Config,
    store: Store,
    worker_handles: HashMap<i64, WorkerHandle>,
}

impl Daemon {
    /// Loads configuration from `config_path` and opens the Store.
    pub fn new(config_path: &Path) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        Self::with_config(config)
    }

    /// Loads configuration from the conventional `xdtranscode.toml` path in
    /// the current directory.
    pub fn new_with_default_config_path() -> Result<Self, DaemonError> {
        Self::new(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        create_required_directories(&config)?;
        let store = Store::open(&config.database.path)?;
        Ok(Self { config, store, worker_handles: HashMap::new() })
    }

    pub fn status_facade(&self) -> StatusFacade {
        StatusFacade::new(self.store.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ensures at least one Worker row exists so a freshly bootstrapped
    /// database can process jobs immediately.
    fn ensure_default_worker(&self) -> Result<(), DaemonError> {
        if self.store.list_workers()?.is_empty() {
            self.store.create_worker(&Worker {
                id: 0,
                name: "default".to_string(),
                active: true,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 1,
            })?;
        }
        Ok(())
    }

    fn start_workers(&mut self) -> Result<(), DaemonError> {
        for worker in self.store.list_workers()?.into_iter().filter(|w| w.active) {
            let handle = worker_pool::start_worker(
                self.store.clone(),
                self.config.clone(),
                worker.id,
                worker.max_concurrent_jobs,
            );
            self.worker_handles.insert(worker.id, handle);
        }
        Ok(())
    }

    /// Runs the daemon forever: starts the SourceSupervisor reconciliation
    /// loop, starts all active Workers, and serves the read-only status
    /// endpoint. Returns only on a fatal startup error (e.g. the status
    /// server's port is already bound).
    pub async fn run(mut self) -> Result<(), DaemonError> {
        self.ensure_default_worker()?;
        self.start_workers()?;

        let supervisor = SourceSupervisor::new(self.store.clone(), self.config.timing.clone());
        tokio::spawn(supervisor.run());

        info!(port = self.config.status_server.port, "starting status server");
        status_server::run_status_server(self.status_facade(), self.config.status_server.port)
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_config_bootstraps_store_against_temp_path() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = tmp.path().join("sub/xdtranscode.db");

        let daemon = Daemon::with_config(config).unwrap();
        assert!(daemon.store.list_workers().unwrap().is_empty());
    }

    #[test]
    fn ensure_default_worker_creates_exactly_one_worker_on_empty_database() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = tmp.path().join("xdtranscode.db");
        let daemon = Daemon::with_config(config).unwrap();

        daemon.ensure_default_worker().unwrap();
        daemon.ensure_default_worker().unwrap();

        assert_eq!(daemon.store.list_workers().unwrap().len(), 1);
    }

    #[test]
    fn start_workers_creates_one_handle_per_active_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = tmp.path().join("xdtranscode.db");
        let mut daemon = Daemon::with_config(config).unwrap();
        daemon
            .store
            .create_worker(&Worker {
                id: 0,
                name: "w1".to_string(),
                active: true,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 1,
            })
            .unwrap();
        daemon
            .store
            .create_worker(&Worker {
                id: 0,
                name: "w2".to_string(),
                active: false,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 1,
            })
            .unwrap();

        daemon.start_workers().unwrap();
        assert_eq!(daemon.worker_handles.len(), 1);
        for handle in daemon.worker_handles.values() {
            handle.abort();
        }
    }
}
