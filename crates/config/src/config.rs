//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Location of the embedded database and default staging root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("xdtranscode.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// External tool binaries the daemon shells out to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
        }
    }
}

/// Polling intervals, stability windows and probe timeouts (all in seconds).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// Window a LocalSourceWatcher waits before re-checking a candidate's size (§4.2).
    #[serde(default = "default_local_stability_wait_secs")]
    pub local_stability_wait_secs: u64,
    /// How often RemoteSourceWatcher lists the remote directory (§4.3).
    #[serde(default = "default_remote_poll_interval_secs")]
    pub remote_poll_interval_secs: u64,
    /// Window RemoteSourceWatcher waits before re-probing a remote entry's size (§4.3).
    #[serde(default = "default_remote_stability_wait_secs")]
    pub remote_stability_wait_secs: u64,
    /// First wait of the two-step re-verify window for a pre-existing staged file (§4.3).
    #[serde(default = "default_remote_redownload_initial_wait_secs")]
    pub remote_redownload_initial_wait_secs: u64,
    /// Second wait of the two-step re-verify window (initial + recheck ≈ 7s, §4.3).
    #[serde(default = "default_remote_redownload_recheck_wait_secs")]
    pub remote_redownload_recheck_wait_secs: u64,
    /// Backoff after a transport failure before RemoteSourceWatcher reconnects (§4.3, §7).
    #[serde(default = "default_remote_error_backoff_secs")]
    pub remote_error_backoff_secs: u64,
    /// Worker claim-loop poll interval when the queue is empty (§4.6).
    #[serde(default = "default_worker_poll_interval_secs")]
    pub worker_poll_interval_secs: u64,
    /// Backoff a worker loop sleeps after an unexpected internal error.
    #[serde(default = "default_worker_error_backoff_secs")]
    pub worker_error_backoff_secs: u64,
    /// Timeout for the container-duration probe (§5).
    #[serde(default = "default_duration_probe_timeout_secs")]
    pub duration_probe_timeout_secs: u64,
    /// Timeout for the timecode/frame-rate probe (§5).
    #[serde(default = "default_timecode_probe_timeout_secs")]
    pub timecode_probe_timeout_secs: u64,
    /// How often SourceSupervisor reconciles watchers against Store configuration (§4.4).
    #[serde(default = "default_supervisor_reconcile_interval_secs")]
    pub supervisor_reconcile_interval_secs: u64,
}

fn default_local_stability_wait_secs() -> u64 {
    3
}
fn default_remote_poll_interval_secs() -> u64 {
    10
}
fn default_remote_stability_wait_secs() -> u64 {
    3
}
fn default_remote_redownload_initial_wait_secs() -> u64 {
    5
}
fn default_remote_redownload_recheck_wait_secs() -> u64 {
    2
}
fn default_remote_error_backoff_secs() -> u64 {
    30
}
fn default_worker_poll_interval_secs() -> u64 {
    2
}
fn default_worker_error_backoff_secs() -> u64 {
    5
}
fn default_duration_probe_timeout_secs() -> u64 {
    10
}
fn default_timecode_probe_timeout_secs() -> u64 {
    15
}
fn default_supervisor_reconcile_interval_secs() -> u64 {
    5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            local_stability_wait_secs: default_local_stability_wait_secs(),
            remote_poll_interval_secs: default_remote_poll_interval_secs(),
            remote_stability_wait_secs: default_remote_stability_wait_secs(),
            remote_redownload_initial_wait_secs: default_remote_redownload_initial_wait_secs(),
            remote_redownload_recheck_wait_secs: default_remote_redownload_recheck_wait_secs(),
            remote_error_backoff_secs: default_remote_error_backoff_secs(),
            worker_poll_interval_secs: default_worker_poll_interval_secs(),
            worker_error_backoff_secs: default_worker_error_backoff_secs(),
            duration_probe_timeout_secs: default_duration_probe_timeout_secs(),
            timecode_probe_timeout_secs: default_timecode_probe_timeout_secs(),
            supervisor_reconcile_interval_secs: default_supervisor_reconcile_interval_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Read-only status HTTP endpoint configuration (§6 ambient observability surface).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerConfig {
    #[serde(default = "default_status_server_port")]
    pub port: u16,
}

fn default_status_server_port() -> u16 {
    7879
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            port: default_status_server_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - XDTRANSCODE_DATABASE_PATH -> database.path
    /// - XDTRANSCODE_FFMPEG_BIN -> tools.ffmpeg_bin
    /// - XDTRANSCODE_FFPROBE_BIN -> tools.ffprobe_bin
    /// - XDTRANSCODE_LOG_LEVEL -> logging.level
    /// - XDTRANSCODE_STATUS_PORT -> status_server.port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("XDTRANSCODE_DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("XDTRANSCODE_FFMPEG_BIN") {
            self.tools.ffmpeg_bin = val;
        }

        if let Ok(val) = env::var("XDTRANSCODE_FFPROBE_BIN") {
            self.tools.ffprobe_bin = val;
        }

        if let Ok(val) = env::var("XDTRANSCODE_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = env::var("XDTRANSCODE_STATUS_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.status_server.port = port;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}
