//! SourceSupervisor (§4.4): owns the set of active Source watchers and
//! reconciles them against the Store on a timer.
//!
//! Grounded on the teacher's `daemon.rs` run-loop shape (a process-scoped
//! map of running tasks reconciled against configuration) generalized to
//! multiple Sources of two different kinds, and on
//! `watchfolder_manager.py::WatchFolderManager`'s start/stop/reconcile
//! semantics (a REMOTE Source missing host/username goes straight to ERROR
//! without a watcher task being started).

use crate::local_watcher;
use crate::remote_watcher;
use crate::store::{SourceKind, SourceStatus, Store};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};
use xdtranscode_config::TimingConfig;

struct RunningWatcher {
    handle: JoinHandle<()>,
    /// Fingerprint of the kind-defining attributes at spawn time; a mismatch
    /// on the next reconcile pass means the watcher must be restarted.
    fingerprint: String,
}

/// Holds `source_id -> running watcher task` and keeps it in sync with the
/// Store. Runs until the process is torn down.
pub struct SourceSupervisor {
    store: Store,
    timing: TimingConfig,
    running: HashMap<i64, RunningWatcher>,
}

impl SourceSupervisor {
    pub fn new(store: Store, timing: TimingConfig) -> Self {
        Self { store, timing, running: HashMap::new() }
    }

    /// Runs the reconciliation loop forever, polling the Store every
    /// `supervisor_reconcile_interval_secs` (§4.4: there is no push
    /// notification from the admin façade into the core).
    pub async fn run(mut self) {
        loop {
            self.reconcile();
            sleep(Duration::from_secs(self.timing.supervisor_reconcile_interval_secs)).await;
        }
    }

    fn reconcile(&mut self) {
        let sources = match self.store.list_sources() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to list sources during reconcile");
                return;
            }
        };

        let active_ids: Vec<i64> = sources.iter().filter(|s| s.active).map(|s| s.id).collect();

        // Stop watchers for Sources that were deleted or deactivated.
        let stale: Vec<i64> = self
            .running
            .keys()
            .copied()
            .filter(|id| !active_ids.contains(id))
            .collect();
        for id in stale {
            if let Some(running) = self.running.remove(&id) {
                running.handle.abort();
                info!(source_id = id, "stopped watcher for inactive/removed source");
            }
        }

        for source in sources.into_iter().filter(|s| s.active) {
            let fingerprint = fingerprint_source(&source);
            let needs_restart = match self.running.get(&source.id) {
                Some(running) => running.fingerprint != fingerprint,
                None => true,
            };
            if !needs_restart {
                continue;
            }

            if let Some(running) = self.running.remove(&source.id) {
                running.handle.abort();
            }

            if source.kind == SourceKind::Remote && (source.host.is_none() || source.username.is_none()) {
                warn!(source_id = source.id, "REMOTE source missing host/username, marking ERROR");
                let _ = self.store.set_source_status(source.id, SourceStatus::Error);
                continue;
            }

            let profile = source.profile_id.and_then(|id| self.store.get_profile(id).ok());
            let store = self.store.clone();
            let timing = self.timing.clone();
            let source_id = source.id;
            let kind = source.kind;

            let handle = tokio::spawn(async move {
                let result = match kind {
                    SourceKind::Local => local_watcher::run(store, source, profile, timing).await,
                    SourceKind::Remote => remote_watcher::run(store, source, profile, timing).await,
                };
                if let Err(e) = result {
                    warn!(source_id, error = %e, "watcher task exited with an error");
                }
            });

            info!(source_id = source_id, "started watcher");
            self.running.insert(source_id, RunningWatcher { handle, fingerprint });
        }
    }
}

/// Kind-defining attributes: a change to any of these means the watcher
/// must be restarted rather than left running against stale configuration.
fn fingerprint_source(source: &crate::store::Source) -> String {
    format!(
        "{:?}|{}|{}|{}|{}|{:?}",
        source.kind,
        source.local_path.as_deref().unwrap_or(""),
        source.host.as_deref().unwrap_or(""),
        source.remote_path.as_deref().unwrap_or(""),
        source.username.as_deref().unwrap_or(""),
        source.port,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Source, SourceKind, SourceStatus};
    use chrono::Utc;

    fn remote_source_missing_credentials() -> Source {
        Source {
            id: 1,
            name: "r1".to_string(),
            kind: SourceKind::Remote,
            local_path: None,
            host: None,
            port: None,
            username: None,
            password: None,
            remote_path: None,
            staging_path: None,
            output_path: None,
            archive_path: None,
            profile_id: None,
            active: true,
            status: SourceStatus::Idle,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reconcile_marks_remote_source_error_when_missing_credentials() {
        let store = Store::open_in_memory().unwrap();
        let mut source = remote_source_missing_credentials();
        source.id = store.create_source(&source).unwrap();

        let mut supervisor = SourceSupervisor::new(store.clone(), TimingConfig::default());
        supervisor.reconcile();

        let reloaded = store.get_source(source.id).unwrap();
        assert_eq!(reloaded.status, SourceStatus::Error);
        assert!(!supervisor.running.contains_key(&source.id));
    }

    #[test]
    fn fingerprint_differs_when_local_path_changes() {
        let mut source = remote_source_missing_credentials();
        source.kind = SourceKind::Local;
        source.local_path = Some("/a".to_string());
        let fp1 = fingerprint_source(&source);
        source.local_path = Some("/b".to_string());
        let fp2 = fingerprint_source(&source);
        assert_ne!(fp1, fp2);
    }
}
