//! StatusFacade (§6): the in-process programmatic surface over the Store —
//! CRUD for Source/Profile/Worker, Job listings/detail, and the read-only
//! status snapshot the ambient HTTP endpoint serves.
//!
//! Grounded on the teacher's `metrics.rs` for the snapshot-struct shape,
//! adapted from a push-updated `SharedMetrics` cache to a pull model: the
//! Store is already the single source of truth (§4.1), so the snapshot is
//! computed fresh on each read rather than kept in a parallel cache that
//! could drift from it.

use crate::error::StoreError;
use crate::store::{Job, Profile, Source, SourceJobCounts, Store, Worker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub sources: Vec<SourceJobCounts>,
    pub recent_jobs: Vec<Job>,
    pub active_workers: Vec<Worker>,
}

const RECENT_JOBS_LIMIT: usize = 50;

/// Thin, cloneable handle used both by the axum router (as `State`) and
/// directly by other in-process callers (e.g. a future CLI admin command).
#[derive(Clone)]
pub struct StatusFacade {
    store: Store,
}

impl StatusFacade {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Result<StatusSnapshot, StoreError> {
        let sources = self.store.source_job_counts()?;
        let mut recent_jobs = self.store.list_jobs()?;
        recent_jobs.truncate(RECENT_JOBS_LIMIT);
        let active_workers = self
            .store
            .list_workers()?
            .into_iter()
            .filter(|w| w.active)
            .collect();

        Ok(StatusSnapshot { sources, recent_jobs, active_workers })
    }

    pub fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.store.list_sources()
    }

    pub fn create_source(&self, source: &Source) -> Result<i64, StoreError> {
        self.store.create_source(source)
    }

    pub fn update_source(&self, source: &Source) -> Result<(), StoreError> {
        self.store.update_source(source)
    }

    pub fn delete_source(&self, id: i64) -> Result<(), StoreError> {
        self.store.delete_source(id)
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        self.store.list_profiles()
    }

    pub fn create_profile(&self, profile: &Profile) -> Result<i64, StoreError> {
        self.store.create_profile(profile)
    }

    pub fn update_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.store.update_profile(profile)
    }

    pub fn delete_profile(&self, id: i64) -> Result<(), StoreError> {
        self.store.delete_profile(id)
    }

    pub fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        self.store.list_workers()
    }

    pub fn create_worker(&self, worker: &Worker) -> Result<i64, StoreError> {
        self.store.create_worker(worker)
    }

    pub fn update_worker(&self, worker: &Worker) -> Result<(), StoreError> {
        self.store.update_worker(worker)
    }

    pub fn delete_worker(&self, id: i64) -> Result<(), StoreError> {
        self.store.delete_worker(id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.store.list_jobs()
    }

    pub fn get_job(&self, id: i64) -> Result<Job, StoreError> {
        self.store.get_job(id)
    }
}
