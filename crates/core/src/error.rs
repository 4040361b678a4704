//! Error types for the ingest/transcode pipeline.
//!
//! Each concern that can fail gets its own enum, matching §7's six named error
//! kinds (Configuration, Transport, Pre-flight, Spawn, Transcoding, Post-completion).

use thiserror::Error;

/// Errors raised by the Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("profile {0} is referenced by an existing job and cannot be deleted")]
    ProfileInUse(i64),

    #[error("no such source: {0}")]
    SourceNotFound(i64),

    #[error("no such worker: {0}")]
    WorkerNotFound(i64),

    #[error("no such job: {0}")]
    JobNotFound(i64),
}

/// Errors raised while probing a media file with the external probing tool.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("ffprobe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a SourceWatcher (LOCAL or REMOTE). Corresponds to §7's
/// "Configuration error" and "Transport error" kinds.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by JobFactory while materializing a candidate into a Job.
#[derive(Debug, Error)]
pub enum JobFactoryError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDirCreation {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("output directory {0} is not writable")]
    OutputDirNotWritable(std::path::PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while running a single Job (§4.7). Corresponds to §7's
/// Pre-flight, Spawn, and Transcoding error kinds.
#[derive(Debug, Error)]
pub enum JobRunError {
    #[error("pre-flight check failed: {0}")]
    PreFlight(String),

    #[error("failed to spawn external tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("transcoding failed: {0}")]
    Transcoding(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while compiling a Profile into argv (§4.8).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("probe failed while building burn-in filter: {0}")]
    Probe(#[from] ProbeError),
}

/// Top-level daemon wiring error.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] xdtranscode_config::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}
