//! REMOTE Source watcher (§4.3): polls an FTP server for new files.
//!
//! Grounded almost line-for-line on `ftp_watcher.py`'s `FTPWatcher`: a
//! `known_files` set to avoid re-listing files already seen this run, a
//! stability check on the remote file's reported size, download to a local
//! staging directory, then a second stability check on the staged file
//! (covering the case where a previous run left a partial download behind),
//! and an error backoff on transport failures. Ported onto `suppaftp`'s
//! async client in place of `ftputil`.

use crate::error::WatcherError;
use crate::job_factory;
use crate::store::{Profile, Source, SourceStatus, Store};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::AsyncFtpStream;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use xdtranscode_config::TimingConfig;

const ALLOWED_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mxf", ".mkv", ".mts", ".m2ts"];

fn is_allowed_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Runs the REMOTE watcher for `source` in a loop until cancelled. Returns
/// an error only for configuration problems discovered before the first
/// connection attempt (§4.4: a REMOTE Source missing host/username must
/// fail without starting).
pub async fn run(
    store: Store,
    source: Source,
    profile: Option<Profile>,
    timing: TimingConfig,
) -> Result<(), WatcherError> {
    let host = source
        .host
        .clone()
        .ok_or_else(|| WatcherError::Configuration("REMOTE source has no host".to_string()))?;
    let username = source
        .username
        .clone()
        .ok_or_else(|| WatcherError::Configuration("REMOTE source has no username".to_string()))?;
    let port = source.port.unwrap_or(21);
    let password = source.password.clone().unwrap_or_default();
    let remote_dir = source.remote_path.clone().unwrap_or_else(|| "/".to_string());
    let staging_dir = PathBuf::from(
        source
            .staging_path
            .clone()
            .unwrap_or_else(|| "/tmp/xdtranscode_ftp".to_string()),
    );

    store
        .set_source_status(source.id, SourceStatus::Monitoring)
        .map_err(|e| WatcherError::Configuration(e.to_string()))?;
    info!(source_id = source.id, %host, port, "REMOTE source monitoring started");

    let mut known_files: HashSet<String> = HashSet::new();

    loop {
        match poll_once(
            &store,
            &source,
            profile.as_ref(),
            &host,
            port,
            &username,
            &password,
            &remote_dir,
            &staging_dir,
            &timing,
            &mut known_files,
        )
        .await
        {
            Ok(()) => {
                sleep(Duration::from_secs(timing.remote_poll_interval_secs)).await;
            }
            Err(e) => {
                error!(source_id = source.id, error = %e, "REMOTE poll cycle failed");
                let _ = store.set_source_status(source.id, SourceStatus::Error);
                sleep(Duration::from_secs(timing.remote_error_backoff_secs)).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_once(
    store: &Store,
    source: &Source,
    profile: Option<&Profile>,
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    remote_dir: &str,
    staging_dir: &Path,
    timing: &TimingConfig,
    known_files: &mut HashSet<String>,
) -> Result<(), WatcherError> {
    let mut ftp = AsyncFtpStream::connect((host, port))
        .await
        .map_err(|e| WatcherError::Transport(e.to_string()))?;
    ftp.login(username, password)
        .await
        .map_err(|e| WatcherError::Transport(e.to_string()))?;
    if remote_dir != "/" {
        ftp.cwd(remote_dir)
            .await
            .map_err(|e| WatcherError::Transport(e.to_string()))?;
    }

    let names = ftp
        .nlst(None)
        .await
        .map_err(|e| WatcherError::Transport(e.to_string()))?;

    let existing_filenames: HashSet<String> = store
        .list_jobs_for_source(source.id)
        .map_err(|e| WatcherError::Configuration(e.to_string()))?
        .into_iter()
        .map(|j| j.input_filename)
        .collect();

    for name in names {
        if !is_allowed_extension(&name) {
            continue;
        }
        if known_files.contains(&name) || existing_filenames.contains(&name) {
            known_files.insert(name);
            continue;
        }

        let size_before = ftp.size(&name).await.unwrap_or(0);
        if size_before > 0 {
            sleep(Duration::from_secs(timing.remote_stability_wait_secs)).await;
            let size_after = ftp.size(&name).await.unwrap_or(size_before);
            if size_after != size_before {
                debug!(file = %name, "still uploading on remote, will re-check next cycle");
                continue;
            }
        }

        info!(file = %name, size = size_before, "new file detected on REMOTE source");
        if let Err(e) = download_and_queue(
            store,
            source,
            profile,
            &mut ftp,
            &name,
            staging_dir,
            timing,
        )
        .await
        {
            warn!(file = %name, error = %e, "failed to process REMOTE candidate");
        }
        known_files.insert(name);
    }

    let _ = ftp.quit().await;
    store
        .set_source_status(source.id, SourceStatus::Monitoring)
        .map_err(|e| WatcherError::Configuration(e.to_string()))?;
    Ok(())
}

async fn download_and_queue(
    store: &Store,
    source: &Source,
    profile: Option<&Profile>,
    ftp: &mut AsyncFtpStream,
    filename: &str,
    staging_dir: &Path,
    timing: &TimingConfig,
) -> Result<(), WatcherError> {
    tokio::fs::create_dir_all(staging_dir).await.map_err(WatcherError::Io)?;
    let local_path = staging_dir.join(filename);

    // A previous run may have left a partial download in place; re-verify
    // it is no longer changing before trusting it (§4.3's ~7s window).
    if local_path.exists() {
        sleep(Duration::from_secs(timing.remote_redownload_initial_wait_secs)).await;
        let size2 = tokio::fs::metadata(&local_path).await.map_err(WatcherError::Io)?.len();
        sleep(Duration::from_secs(timing.remote_redownload_recheck_wait_secs)).await;
        let size3 = tokio::fs::metadata(&local_path).await.map_err(WatcherError::Io)?.len();
        if size2 != size3 {
            debug!(file = %filename, "previously staged file still changing, deferring");
            return Ok(());
        }
    } else {
        let bytes = ftp
            .retr_as_buffer(filename)
            .await
            .map_err(|e| WatcherError::Transport(e.to_string()))?
            .into_inner();
        tokio::fs::write(&local_path, &bytes).await.map_err(WatcherError::Io)?;
    }

    let size = tokio::fs::metadata(&local_path).await.map_err(WatcherError::Io)?.len();
    if size == 0 {
        let _ = tokio::fs::remove_file(&local_path).await;
        return Ok(());
    }

    let job = job_factory::materialize_job(store, source, profile, filename, &local_path, Some(size))
        .map_err(|e| WatcherError::Configuration(e.to_string()))?;
    info!(source_id = source.id, job_id = job.id, file = %filename, "queued job from REMOTE source");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        assert!(is_allowed_extension("CLIP.MXF"));
        assert!(is_allowed_extension("clip.mts"));
        assert!(!is_allowed_extension("readme.txt"));
    }
}
