//! Durable record of Sources, Profiles, Workers and Jobs (§3, §4.1).
//!
//! Backed by a single embedded SQLite database. Schema bootstrap is
//! additive: `CREATE TABLE IF NOT EXISTS` followed by a `PRAGMA table_info`
//! scan per table, issuing `ALTER TABLE ... ADD COLUMN` for any column the
//! running binary expects but the on-disk schema lacks. Existing rows are
//! never rewritten or dropped by a migration.

mod migrate;
mod schema;

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Kind of ingest point a Source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Remote,
}

impl SourceKind {
    fn as_str(self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Remote => "remote",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "remote" => SourceKind::Remote,
            _ => SourceKind::Local,
        }
    }
}

/// Observable status of a Source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Idle,
    Monitoring,
    Error,
}

impl SourceStatus {
    fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Idle => "idle",
            SourceStatus::Monitoring => "monitoring",
            SourceStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "monitoring" => SourceStatus::Monitoring,
            "error" => SourceStatus::Error,
            _ => SourceStatus::Idle,
        }
    }
}

/// Observable status of a Worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Running,
    Error,
}

impl WorkerStatus {
    fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Running => "running",
            WorkerStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "running" => WorkerStatus::Running,
            "error" => WorkerStatus::Error,
            _ => WorkerStatus::Idle,
        }
    }
}

/// Lifecycle status of a Job (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending,
        }
    }

    /// A Job in this status is not terminal and may still transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub local_path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub remote_path: Option<String>,
    pub staging_path: Option<String>,
    pub output_path: Option<String>,
    pub archive_path: Option<String>,
    pub profile_id: Option<i64>,
    pub active: bool,
    pub status: SourceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub video_codec: String,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: Option<String>,
    pub audio_sample_rate: String,
    pub audio_channels: String,
    pub container: String,
    pub extra_args: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub status: WorkerStatus,
    pub current_job_id: Option<i64>,
    pub max_concurrent_jobs: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Job {
    pub id: i64,
    pub source_id: i64,
    pub profile_id: Option<i64>,
    pub worker_id: Option<i64>,
    pub input_filename: String,
    pub input_path: String,
    pub output_path: String,
    pub status: JobStatus,
    pub progress: u8,
    pub input_size_bytes: Option<u64>,
    pub output_size_bytes: Option<u64>,
    pub input_duration_secs: Option<f64>,
    pub output_duration_secs: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate view used by StatusFacade.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceJobCounts {
    pub source_id: i64,
    pub source_name: String,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

fn row_to_source(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: SourceKind::parse(&row.get::<_, String>("kind")?),
        local_path: row.get("local_path")?,
        host: row.get("host")?,
        port: row.get::<_, Option<i64>>("port")?.map(|p| p as u16),
        username: row.get("username")?,
        password: row.get("password")?,
        remote_path: row.get("remote_path")?,
        staging_path: row.get("staging_path")?,
        output_path: row.get("output_path")?,
        archive_path: row.get("archive_path")?,
        profile_id: row.get("profile_id")?,
        active: row.get::<_, i64>("active")? != 0,
        status: SourceStatus::parse(&row.get::<_, String>("status")?),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        video_codec: row.get("video_codec")?,
        video_bitrate: row.get("video_bitrate")?,
        audio_codec: row.get("audio_codec")?,
        audio_bitrate: row.get("audio_bitrate")?,
        audio_sample_rate: row.get("audio_sample_rate")?,
        audio_channels: row.get("audio_channels")?,
        container: row.get("container")?,
        extra_args: row.get("extra_args")?,
    })
}

fn row_to_worker(row: &Row) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get("id")?,
        name: row.get("name")?,
        active: row.get::<_, i64>("active")? != 0,
        status: WorkerStatus::parse(&row.get::<_, String>("status")?),
        current_job_id: row.get("current_job_id")?,
        max_concurrent_jobs: row.get::<_, i64>("max_concurrent_jobs")? as u32,
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let parse_dt = |s: Option<String>| s.and_then(|s| s.parse().ok());
    Ok(Job {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        profile_id: row.get("profile_id")?,
        worker_id: row.get("worker_id")?,
        input_filename: row.get("input_filename")?,
        input_path: row.get("input_path")?,
        output_path: row.get("output_path")?,
        status: JobStatus::parse(&row.get::<_, String>("status")?),
        progress: row.get::<_, i64>("progress")? as u8,
        input_size_bytes: row.get::<_, Option<i64>>("input_size_bytes")?.map(|v| v as u64),
        output_size_bytes: row.get::<_, Option<i64>>("output_size_bytes")?.map(|v| v as u64),
        input_duration_secs: row.get("input_duration_secs")?,
        output_duration_secs: row.get("output_duration_secs")?,
        error_message: row.get("error_message")?,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        started_at: parse_dt(row.get("started_at")?),
        completed_at: parse_dt(row.get("completed_at")?),
    })
}

/// Durable store over a SQLite connection.
///
/// Wrapped in a mutex rather than a connection pool: SQLite serializes
/// writes internally and the daemon's write volume (job transitions, a
/// few hundred rows) does not warrant a pool. Callers invoke these
/// methods from `spawn_blocking` (§5): the connection itself is not async.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the database at `path`, bootstrap the
    /// schema, and additively migrate it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::create_tables(&conn)?;
        migrate::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        migrate::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- Source CRUD ----

    pub fn create_source(&self, s: &Source) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sources
             (name, kind, local_path, host, port, username, password, remote_path,
              staging_path, output_path, archive_path, profile_id, active, status, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                s.name,
                s.kind.as_str(),
                s.local_path,
                s.host,
                s.port.map(|p| p as i64),
                s.username,
                s.password,
                s.remote_path,
                s.staging_path,
                s.output_path,
                s.archive_path,
                s.profile_id,
                s.active as i64,
                s.status.as_str(),
                s.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_source(&self, id: i64) -> Result<Source, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM sources WHERE id = ?1", params![id], row_to_source)
            .optional()?
            .ok_or(StoreError::SourceNotFound(id))
    }

    pub fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM sources ORDER BY id")?;
        let rows = stmt.query_map([], row_to_source)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_source(&self, s: &Source) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sources SET name=?1, kind=?2, local_path=?3, host=?4, port=?5,
             username=?6, password=?7, remote_path=?8, staging_path=?9, output_path=?10,
             archive_path=?11, profile_id=?12, active=?13, status=?14 WHERE id=?15",
            params![
                s.name,
                s.kind.as_str(),
                s.local_path,
                s.host,
                s.port.map(|p| p as i64),
                s.username,
                s.password,
                s.remote_path,
                s.staging_path,
                s.output_path,
                s.archive_path,
                s.profile_id,
                s.active as i64,
                s.status.as_str(),
                s.id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::SourceNotFound(s.id));
        }
        Ok(())
    }

    pub fn set_source_status(&self, id: i64, status: SourceStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sources SET status=?1 WHERE id=?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn delete_source(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- Profile CRUD ----

    pub fn create_profile(&self, p: &Profile) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profiles
             (name, description, video_codec, video_bitrate, audio_codec, audio_bitrate,
              audio_sample_rate, audio_channels, container, extra_args)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                p.name,
                p.description,
                p.video_codec,
                p.video_bitrate,
                p.audio_codec,
                p.audio_bitrate,
                p.audio_sample_rate,
                p.audio_channels,
                p.container,
                p.extra_args,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_profile(&self, id: i64) -> Result<Profile, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM profiles WHERE id = ?1", params![id], row_to_profile)
            .optional()?
            .ok_or(StoreError::SourceNotFound(id))
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM profiles ORDER BY id")?;
        let rows = stmt.query_map([], row_to_profile)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_profile(&self, p: &Profile) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE profiles SET name=?1, description=?2, video_codec=?3, video_bitrate=?4,
             audio_codec=?5, audio_bitrate=?6, audio_sample_rate=?7, audio_channels=?8,
             container=?9, extra_args=?10 WHERE id=?11",
            params![
                p.name,
                p.description,
                p.video_codec,
                p.video_bitrate,
                p.audio_codec,
                p.audio_bitrate,
                p.audio_sample_rate,
                p.audio_channels,
                p.container,
                p.extra_args,
                p.id,
            ],
        )?;
        Ok(())
    }

    /// Delete a Profile. Refused (§3 invariant) if any Source still references it.
    pub fn delete_profile(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sources WHERE profile_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if in_use > 0 {
            return Err(StoreError::ProfileInUse(id));
        }
        conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- Worker CRUD ----

    pub fn create_worker(&self, w: &Worker) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO workers (name, active, status, current_job_id, max_concurrent_jobs)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                w.name,
                w.active as i64,
                w.status.as_str(),
                w.current_job_id,
                w.max_concurrent_jobs as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_worker(&self, id: i64) -> Result<Worker, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM workers WHERE id = ?1", params![id], row_to_worker)
            .optional()?
            .ok_or(StoreError::WorkerNotFound(id))
    }

    pub fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM workers ORDER BY id")?;
        let rows = stmt.query_map([], row_to_worker)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_worker_status(&self, id: i64, status: WorkerStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE workers SET status=?1 WHERE id=?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Updates a Worker's name, active flag, status, current job and
    /// concurrency slot count. Used to rename a Worker, toggle it
    /// active/inactive, or change its slot count.
    pub fn update_worker(&self, w: &Worker) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE workers SET name=?1, active=?2, status=?3, current_job_id=?4,
             max_concurrent_jobs=?5 WHERE id=?6",
            params![
                w.name,
                w.active as i64,
                w.status.as_str(),
                w.current_job_id,
                w.max_concurrent_jobs as i64,
                w.id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::WorkerNotFound(w.id));
        }
        Ok(())
    }

    pub fn delete_worker(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM workers WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- Job lifecycle (§4.1) ----

    /// Returns the existing non-terminal Job for `(source_id, filename)` if
    /// one exists; otherwise inserts a new PENDING Job. Sole deduplication
    /// point per §4.1.
    pub fn insert_job_if_absent(
        &self,
        source_id: i64,
        profile_id: Option<i64>,
        filename: &str,
        input_path: &str,
        output_path: &str,
        input_size_bytes: Option<u64>,
    ) -> Result<Job, StoreError> {
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                "SELECT * FROM jobs WHERE source_id = ?1 AND input_filename = ?2
                 AND status IN ('pending','processing') LIMIT 1",
                params![source_id, filename],
                row_to_job,
            )
            .optional()?;
        if let Some(job) = existing {
            return Ok(job);
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO jobs
             (source_id, profile_id, worker_id, input_filename, input_path, output_path,
              status, progress, input_size_bytes, created_at)
             VALUES (?1,?2,NULL,?3,?4,?5,'pending',0,?6,?7)",
            params![
                source_id,
                profile_id,
                filename,
                input_path,
                output_path,
                input_size_bytes.map(|v| v as i64),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], row_to_job)
            .map_err(StoreError::from)
    }

    /// Atomically selects one PENDING Job with no owner, transitions it to
    /// PROCESSING, sets `worker_id` and `started_at`. FIFO by `created_at`.
    /// Using `BEGIN IMMEDIATE` guarantees only one caller wins the claim
    /// even under concurrent callers sharing this same connection mutex —
    /// the mutex already makes it atomic from this process's perspective.
    pub fn claim_next_pending_job(&self, worker_id: i64) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM jobs WHERE status = 'pending' AND worker_id IS NULL
                 ORDER BY created_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(job_id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let updated = tx.execute(
            "UPDATE jobs SET status='processing', worker_id=?1, started_at=?2
             WHERE id=?3 AND status='pending' AND worker_id IS NULL",
            params![worker_id, now, job_id],
        )?;
        if updated == 0 {
            // Lost the race to another claimant between select and update.
            tx.commit()?;
            return Ok(None);
        }
        let job = tx.query_row("SELECT * FROM jobs WHERE id = ?1", params![job_id], row_to_job)?;
        tx.commit()?;
        Ok(Some(job))
    }

    /// Advances `progress`. Fails silently (no-op) if the Job is no longer PROCESSING.
    pub fn update_progress(&self, job_id: i64, percent: u8) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET progress=?1 WHERE id=?2 AND status='processing'",
            params![percent.min(100) as i64, job_id],
        )?;
        Ok(())
    }

    pub fn complete_job(
        &self,
        job_id: i64,
        output_size_bytes: u64,
        output_duration_secs: Option<f64>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE jobs SET status='completed', progress=100, worker_id=NULL,
             output_size_bytes=?1, output_duration_secs=?2, completed_at=?3 WHERE id=?4",
            params![output_size_bytes as i64, output_duration_secs, now, job_id],
        )?;
        Ok(())
    }

    pub fn fail_job(&self, job_id: i64, message: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE jobs SET status='failed', worker_id=NULL, error_message=?1, completed_at=?2
             WHERE id=?3",
            params![message, now, job_id],
        )?;
        Ok(())
    }

    pub fn set_input_duration(&self, job_id: i64, duration_secs: f64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET input_duration_secs=?1 WHERE id=?2",
            params![duration_secs, job_id],
        )?;
        Ok(())
    }

    pub fn get_job(&self, id: i64) -> Result<Job, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], row_to_job)
            .optional()?
            .ok_or(StoreError::JobNotFound(id))
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_jobs_for_source(&self, source_id: i64) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE source_id = ?1 ORDER BY created_at DESC")?;
        let rows = stmt.query_map(params![source_id], row_to_job)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Per-Source Job status counts, for StatusFacade's status snapshot (§6).
    pub fn source_job_counts(&self) -> Result<Vec<SourceJobCounts>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name,
                SUM(CASE WHEN j.status='pending' THEN 1 ELSE 0 END),
                SUM(CASE WHEN j.status='processing' THEN 1 ELSE 0 END),
                SUM(CASE WHEN j.status='completed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN j.status='failed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN j.status='cancelled' THEN 1 ELSE 0 END)
             FROM sources s LEFT JOIN jobs j ON j.source_id = s.id
             WHERE s.active = 1
             GROUP BY s.id, s.name
             ORDER BY s.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SourceJobCounts {
                source_id: row.get(0)?,
                source_name: row.get(1)?,
                pending: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                processing: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                completed: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                failed: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                cancelled: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source(name: &str) -> Source {
        Source {
            id: 0,
            name: name.to_string(),
            kind: SourceKind::Local,
            local_path: Some("/watch".to_string()),
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
    fn insert_job_if_absent_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();

        let j1 = store
            .insert_job_if_absent(source_id, None, "clip.mov", "/watch/clip.mov", "/out/clip.mxf", Some(1000))
            .unwrap();
        let j2 = store
            .insert_job_if_absent(source_id, None, "clip.mov", "/watch/clip.mov", "/out/clip.mxf", Some(1000))
            .unwrap();

        assert_eq!(j1.id, j2.id);
        assert_eq!(store.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn insert_job_if_absent_allows_new_job_after_terminal() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();

        let j1 = store
            .insert_job_if_absent(source_id, None, "clip.mov", "/watch/clip.mov", "/out/clip.mxf", Some(1000))
            .unwrap();
        store.complete_job(j1.id, 500, Some(10.0)).unwrap();

        let j2 = store
            .insert_job_if_absent(source_id, None, "clip.mov", "/watch/clip.mov", "/out/clip.mxf", Some(1000))
            .unwrap();

        assert_ne!(j1.id, j2.id);
        assert_eq!(store.list_jobs().unwrap().len(), 2);
    }

    #[test]
    fn claim_next_pending_job_is_fifo_and_single_winner() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();

        let j1 = store
            .insert_job_if_absent(source_id, None, "a.mov", "/watch/a.mov", "/out/a.mxf", None)
            .unwrap();
        let _j2 = store
            .insert_job_if_absent(source_id, None, "b.mov", "/watch/b.mov", "/out/b.mxf", None)
            .unwrap();

        let claimed = store.claim_next_pending_job(1).unwrap().unwrap();
        assert_eq!(claimed.id, j1.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.worker_id, Some(1));

        // Same job cannot be claimed again by a second worker.
        let second_claim_on_same_job = store.get_job(j1.id).unwrap();
        assert_eq!(second_claim_on_same_job.worker_id, Some(1));
    }

    #[test]
    fn claim_next_pending_job_returns_none_when_queue_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.claim_next_pending_job(1).unwrap().is_none());
    }

    #[test]
    fn complete_job_sets_terminal_fields_and_clears_owner() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();
        let job = store
            .insert_job_if_absent(source_id, None, "a.mov", "/watch/a.mov", "/out/a.mxf", None)
            .unwrap();
        store.claim_next_pending_job(7).unwrap();
        store.complete_job(job.id, 12345, Some(42.5)).unwrap();

        let done = store.get_job(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.worker_id, None);
        assert_eq!(done.output_size_bytes, Some(12345));
    }

    #[test]
    fn fail_job_clears_owner_and_sets_message() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();
        let job = store
            .insert_job_if_absent(source_id, None, "a.mov", "/watch/a.mov", "/out/a.mxf", None)
            .unwrap();
        store.claim_next_pending_job(7).unwrap();
        store.fail_job(job.id, "boom").unwrap();

        let done = store.get_job(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.worker_id, None);
        assert_eq!(done.error_message, Some("boom".to_string()));
    }

    #[test]
    fn update_progress_is_noop_when_not_processing() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();
        let job = store
            .insert_job_if_absent(source_id, None, "a.mov", "/watch/a.mov", "/out/a.mxf", None)
            .unwrap();

        // Job is still PENDING, not PROCESSING.
        store.update_progress(job.id, 50).unwrap();
        let reloaded = store.get_job(job.id).unwrap();
        assert_eq!(reloaded.progress, 0);
    }

    #[test]
    fn delete_profile_refused_when_in_use() {
        let store = Store::open_in_memory().unwrap();
        let profile_id = store
            .create_profile(&Profile {
                id: 0,
                name: "H264_LOWRES_TC".to_string(),
                description: None,
                video_codec: "libx264".to_string(),
                video_bitrate: "2M".to_string(),
                audio_codec: "aac".to_string(),
                audio_bitrate: Some("128k".to_string()),
                audio_sample_rate: "48000".to_string(),
                audio_channels: "2".to_string(),
                container: "mp4".to_string(),
                extra_args: None,
            })
            .unwrap();

        let mut source = test_source("watch1");
        source.profile_id = Some(profile_id);
        store.create_source(&source).unwrap();

        let result = store.delete_profile(profile_id);
        assert!(matches!(result, Err(StoreError::ProfileInUse(_))));
    }

    #[test]
    fn update_worker_persists_renamed_and_toggled_fields() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_worker(&Worker {
                id: 0,
                name: "w1".to_string(),
                active: true,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 1,
            })
            .unwrap();

        store
            .update_worker(&Worker {
                id,
                name: "w1-renamed".to_string(),
                active: false,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 4,
            })
            .unwrap();

        let reloaded = store.get_worker(id).unwrap();
        assert_eq!(reloaded.name, "w1-renamed");
        assert!(!reloaded.active);
        assert_eq!(reloaded.max_concurrent_jobs, 4);
    }

    #[test]
    fn update_worker_unknown_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let result = store.update_worker(&Worker {
            id: 999,
            name: "ghost".to_string(),
            active: true,
            status: WorkerStatus::Idle,
            current_job_id: None,
            max_concurrent_jobs: 1,
        });
        assert!(matches!(result, Err(StoreError::WorkerNotFound(999))));
    }

    #[test]
    fn delete_worker_removes_it_from_list() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_worker(&Worker {
                id: 0,
                name: "w1".to_string(),
                active: true,
                status: WorkerStatus::Idle,
                current_job_id: None,
                max_concurrent_jobs: 1,
            })
            .unwrap();

        store.delete_worker(id).unwrap();
        assert!(store.list_workers().unwrap().is_empty());
    }

    #[test]
    fn source_job_counts_aggregates_by_status() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.create_source(&test_source("watch1")).unwrap();
        store
            .insert_job_if_absent(source_id, None, "a.mov", "/watch/a.mov", "/out/a.mxf", None)
            .unwrap();
        let j2 = store
            .insert_job_if_absent(source_id, None, "b.mov", "/watch/b.mov", "/out/b.mxf", None)
            .unwrap();
        store.claim_next_pending_job(1).unwrap();
        store.complete_job(j2.id, 10, None).unwrap();

        let counts = store.source_job_counts().unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].pending, 1);
        assert_eq!(counts[0].completed, 1);
    }
}
