//! LOCAL Source watcher (§4.2): a non-recursive, notification-driven watch
//! of a single filesystem directory.
//!
//! Grounded on `watchfolder_manager.py`'s `WatchFolderHandler` for the
//! extension allow-list, stability-before-processing and dedup semantics,
//! restructured around the `notify` crate the way the astrid-capsule
//! watcher reference uses it (mpsc channel fed by a `RecommendedWatcher`
//! callback, processed from an async loop).

use crate::error::WatcherError;
use crate::job_factory;
use crate::stability::{self, StabilityResult};
use crate::store::{Profile, Source, SourceStatus, Store};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use xdtranscode_config::TimingConfig;

/// Extensions eligible for ingest (§4.2), matching the original Python
/// `allowed_extensions` list.
const ALLOWED_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mxf", ".mkv", ".mts", ".m2ts"];

fn is_allowed_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{}", ext.to_lowercase());
    ALLOWED_EXTENSIONS.contains(&dotted.as_str())
}

/// Runs the LOCAL watcher for `source` until its filesystem watch handle is
/// dropped or a fatal configuration/transport error occurs. Expected to run
/// for the lifetime of the Source inside a dedicated task, supervised by
/// `SourceSupervisor`.
pub async fn run(
    store: Store,
    source: Source,
    profile: Option<Profile>,
    timing: TimingConfig,
) -> Result<(), WatcherError> {
    let watch_path = source
        .local_path
        .clone()
        .ok_or_else(|| WatcherError::Configuration("LOCAL source has no local_path".to_string()))?;
    let watch_path = PathBuf::from(watch_path);

    if !watch_path.exists() {
        store
            .set_source_status(source.id, SourceStatus::Error)
            .map_err(|e| WatcherError::Configuration(e.to_string()))?;
        return Err(WatcherError::Configuration(format!(
            "watched path does not exist: {}",
            watch_path.display()
        )));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .map_err(|e| WatcherError::Transport(e.to_string()))?;

    watcher
        .watch(&watch_path, RecursiveMode::NonRecursive)
        .map_err(|e| WatcherError::Transport(e.to_string()))?;

    store
        .set_source_status(source.id, SourceStatus::Monitoring)
        .map_err(|e| WatcherError::Configuration(e.to_string()))?;
    info!(source_id = source.id, path = %watch_path.display(), "LOCAL source monitoring started");

    while let Some(event) = rx.recv().await {
        match event {
            Ok(ev) => handle_event(&store, &source, profile.as_ref(), &ev, &timing).await,
            Err(e) => warn!(source_id = source.id, error = %e, "filesystem watcher error"),
        }
    }

    Ok(())
}

async fn handle_event(
    store: &Store,
    source: &Source,
    profile: Option<&Profile>,
    event: &Event,
    timing: &TimingConfig,
) {
    if !matches!(event.kind, EventKind::Create(_)) {
        return;
    }

    for path in &event.paths {
        if path.is_dir() || !is_allowed_extension(path) {
            continue;
        }
        if let Err(e) = process_candidate(store, source, profile, path, timing).await {
            warn!(source_id = source.id, path = %path.display(), error = %e, "failed to process candidate file");
        }
    }
}

async fn process_candidate(
    store: &Store,
    source: &Source,
    profile: Option<&Profile>,
    path: &Path,
    timing: &TimingConfig,
) -> Result<(), WatcherError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return Ok(()), // Gone already; transient.
    };
    let initial_size = metadata.len();
    if initial_size == 0 {
        return Ok(());
    }

    match stability::check_stability(path, initial_size, timing.local_stability_wait_secs)
        .await
        .map_err(WatcherError::Io)?
    {
        StabilityResult::Unstable { .. } => {
            debug!(path = %path.display(), "file still being written, skipping this cycle");
            return Ok(());
        }
        StabilityResult::Stable => {}
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| WatcherError::Configuration("candidate path has no filename".to_string()))?;

    let job = job_factory::materialize_job(store, source, profile, &filename, path, Some(initial_size))
        .map_err(|e| WatcherError::Configuration(e.to_string()))?;
    info!(source_id = source.id, job_id = job.id, path = %path.display(), "queued job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        assert!(is_allowed_extension(Path::new("clip.MOV")));
        assert!(is_allowed_extension(Path::new("clip.mxf")));
        assert!(!is_allowed_extension(Path::new("clip.txt")));
        assert!(!is_allowed_extension(Path::new("noext")));
    }
}
