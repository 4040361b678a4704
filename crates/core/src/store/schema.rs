//! Initial table definitions. Only ever grows via `ALTER TABLE` in `migrate.rs` —
//! these `CREATE TABLE IF NOT EXISTS` statements must not change shape once released.

use crate::error::StoreError;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            description     TEXT,
            video_codec     TEXT NOT NULL,
            video_bitrate   TEXT NOT NULL,
            audio_codec     TEXT NOT NULL,
            audio_bitrate   TEXT,
            audio_sample_rate TEXT NOT NULL,
            audio_channels  TEXT NOT NULL,
            container       TEXT NOT NULL,
            extra_args      TEXT
        );

        CREATE TABLE IF NOT EXISTS sources (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            kind            TEXT NOT NULL,
            local_path      TEXT,
            host            TEXT,
            port            INTEGER,
            username        TEXT,
            password        TEXT,
            remote_path     TEXT,
            staging_path    TEXT,
            output_path     TEXT,
            archive_path    TEXT,
            profile_id      INTEGER REFERENCES profiles(id),
            active          INTEGER NOT NULL DEFAULT 1,
            status          TEXT NOT NULL DEFAULT 'idle',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workers (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL UNIQUE,
            active              INTEGER NOT NULL DEFAULT 1,
            status              TEXT NOT NULL DEFAULT 'idle',
            current_job_id      INTEGER,
            max_concurrent_jobs INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id              INTEGER NOT NULL REFERENCES sources(id),
            profile_id             INTEGER REFERENCES profiles(id),
            worker_id              INTEGER REFERENCES workers(id),
            input_filename         TEXT NOT NULL,
            input_path             TEXT NOT NULL,
            output_path            TEXT NOT NULL,
            status                 TEXT NOT NULL DEFAULT 'pending',
            progress               INTEGER NOT NULL DEFAULT 0,
            input_size_bytes       INTEGER,
            output_size_bytes      INTEGER,
            input_duration_secs    REAL,
            output_duration_secs   REAL,
            error_message          TEXT,
            created_at             TEXT NOT NULL,
            started_at             TEXT,
            completed_at           TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_source_filename ON jobs(source_id, input_filename);
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        ",
    )?;
    Ok(())
}
