//! Ingest and transcoding pipeline: Source watchers feed a Job queue that a
//! pool of Workers drains, each Job compiled into an external tool
//! invocation and run to completion.

pub mod daemon;
pub mod error;
pub mod job_factory;
pub mod job_runner;
pub mod local_watcher;
pub mod probe;
pub mod profile_compiler;
pub mod remote_watcher;
pub mod stability;
pub mod status;
pub mod status_server;
pub mod store;
pub mod supervisor;
pub mod worker_pool;

pub use xdtranscode_config as config;
pub use xdtranscode_config::Config;

pub use daemon::{init_logging, Daemon};
pub use error::{CompileError, DaemonError, JobFactoryError, JobRunError, ProbeError, StoreError, WatcherError};
pub use job_factory::materialize_job;
pub use probe::{probe_file, ProbeResult};
pub use profile_compiler::compile_argv;
pub use stability::{check_stability, compare_sizes, StabilityResult};
pub use status::{StatusFacade, StatusSnapshot};
pub use status_server::{create_status_router, run_status_server};
pub use store::{Job, JobStatus, Profile, Source, SourceJobCounts, SourceKind, SourceStatus, Store, Worker, WorkerStatus};
pub use worker_pool::start_worker;
