//! Per-job execution pipeline (§4.7).
//!
//! Grounded on `transcoder_worker.py`'s `_process_job`/`_monitor_progress`/
//! `_get_video_duration`/`_archive_original_file`/`_extract_error_message`,
//! restructured into the teacher's stage-by-stage style from
//! `job_executor.rs::execute`.

use crate::error::JobRunError;
use crate::probe;
use crate::profile_compiler;
use crate::store::{Job, JobStatus, Profile, Source, Store};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use xdtranscode_config::{Config, TimingConfig};

const MIN_PROGRESS_WRITE_INTERVAL: Duration = Duration::from_millis(100);

/// Runs one Job end to end, updating Store state at each step. Never
/// propagates an error upward except for Store failures that leave the
/// Job's terminal status unrecorded — those bubble up so the caller (the
/// worker slot loop) can log and move on without crashing the process.
pub async fn run(store: &Store, config: &Config, job: Job) -> Result<(), JobRunError> {
    let source = store.get_source(job.source_id)?;
    let profile = match job.profile_id {
        Some(id) => Some(store.get_profile(id)?),
        None => None,
    };

    if let Err(msg) = preflight(&job, &source) {
        store.fail_job(job.id, &msg)?;
        return Ok(());
    }

    let tool_bin = &config.tools.ffmpeg_bin;
    let ffprobe_bin = &config.tools.ffprobe_bin;
    let input_path = PathBuf::from(&job.input_path);
    let output_path = PathBuf::from(&job.output_path);

    let burnin_probe = if profile
        .as_ref()
        .is_some_and(|p| p.name == profile_compiler::TIMECODE_BURNIN_PROFILE)
    {
        match profile_compiler::probe_for_burnin(ffprobe_bin, &input_path).await {
            Ok(probe) => Some(probe),
            Err(e) => {
                store.fail_job(job.id, &format!("pre-flight check failed: {e}"))?;
                return Ok(());
            }
        }
    } else {
        None
    };

    let argv = match &profile {
        Some(p) => profile_compiler::compile_argv(tool_bin, p, &input_path, &output_path, burnin_probe.as_ref())
            .map_err(|e| JobRunError::PreFlight(e.to_string()))?,
        None => default_argv(tool_bin, &input_path, &output_path),
    };

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            store.fail_job(job.id, &format!("Errore avvio FFmpeg: {e}"))?;
            return Ok(());
        }
    };

    let duration_secs = discover_duration(store, &job, &input_path, ffprobe_bin, &config.timing).await;

    let stderr = child.stderr.take().expect("stderr was piped");
    let mut lines = BufReader::new(stderr).lines();
    let mut last_write = tokio::time::Instant::now() - MIN_PROGRESS_WRITE_INTERVAL;
    let mut last_progress: Option<u8> = None;
    let mut stderr_log = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        stderr_log.push_str(&line);
        stderr_log.push('\n');

        if let Some(duration) = duration_secs {
            if let Some(elapsed) = parse_progress_time(&line) {
                let percent = ((elapsed / duration) * 100.0).round().clamp(0.0, 100.0) as u8;
                if last_progress != Some(percent) && last_write.elapsed() >= MIN_PROGRESS_WRITE_INTERVAL {
                    store.update_progress(job.id, percent)?;
                    last_progress = Some(percent);
                    last_write = tokio::time::Instant::now();
                }
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    let status = child.wait().await.map_err(JobRunError::Spawn)?;

    let output_exists_and_nonempty = tokio::fs::metadata(&output_path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false);

    if status.success() && output_exists_and_nonempty {
        let output_size = tokio::fs::metadata(&output_path).await.map(|m| m.len()).unwrap_or(0);
        store.complete_job(job.id, output_size, duration_secs)?;
        info!(job_id = job.id, "job completed");

        if let Some(archive_path) = &source.archive_path {
            if !archive_path.is_empty() {
                archive_original(&input_path, Path::new(archive_path)).await;
            }
        }
    } else {
        let message = classify_error(&stderr_log, status.code());
        store.fail_job(job.id, &message)?;
        warn!(job_id = job.id, message = %message, "job failed");
    }

    Ok(())
}

fn preflight(job: &Job, source: &Source) -> Result<(), String> {
    let input = Path::new(&job.input_path);
    if !input.exists() {
        return Err(format!("File input non trovato: {}", job.input_path));
    }
    if !is_readable(input) {
        return Err(format!("Permessi insufficienti per leggere il file: {}", job.input_path));
    }

    let output_dir = Path::new(&job.output_path).parent().map(Path::to_path_buf);
    if let Some(dir) = &output_dir {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return Err(format!("Impossibile creare directory output: {e}"));
            }
        }
        if !dir.as_os_str().is_empty() && !is_writable(dir) {
            return Err(format!("Permessi insufficienti per scrivere nella directory: {}", dir.display()));
        }
    }

    let _ = source;
    Ok(())
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o400 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    path.exists()
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o200 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    !std::fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(true)
}

fn default_argv(tool_bin: &str, input: &Path, output: &Path) -> Vec<String> {
    vec![
        tool_bin.to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

async fn discover_duration(
    store: &Store,
    job: &Job,
    input_path: &Path,
    ffprobe_bin: &str,
    timing: &TimingConfig,
) -> Option<f64> {
    if let Some(d) = job.input_duration_secs {
        return Some(d);
    }
    let timeout = Duration::from_secs(timing.duration_probe_timeout_secs);
    match probe::probe_file(ffprobe_bin, input_path, timeout).await {
        Ok(result) => {
            if let Some(d) = result.format.duration_secs {
                let _ = store.set_input_duration(job.id, d);
                return Some(d);
            }
            None
        }
        Err(e) => {
            debug!(job_id = job.id, error = %e, "duration probe failed");
            None
        }
    }
}

/// Parses an ffmpeg-style `time=HH:MM:SS.sss` progress token into elapsed seconds.
fn parse_progress_time(line: &str) -> Option<f64> {
    let idx = line.find("time=")?;
    let rest = &line[idx + 5..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = &rest[..end];

    let mut parts = token.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Ordered substring classifier matching `_extract_error_message` exactly
/// (§4.7 step 5): first match wins, case-insensitive.
fn classify_error(stderr: &str, exit_code: Option<i32>) -> String {
    if stderr.trim().is_empty() {
        return format!("Errore FFmpeg (codice: {})", exit_code.map_or("?".to_string(), |c| c.to_string()));
    }
    let lower = stderr.to_lowercase();

    if lower.contains("permission denied") {
        return "Errore permessi: impossibile accedere al file. Verifica i permessi del file e della directory."
            .to_string();
    }
    if lower.contains("no such file or directory") {
        return "File o directory non trovato. Verifica che il percorso sia corretto.".to_string();
    }
    if lower.contains("invalid data found") {
        return "File video corrotto o formato non supportato.".to_string();
    }
    if lower.contains("cannot open") {
        return "Impossibile aprire il file. Verifica permessi e che il file non sia in uso.".to_string();
    }

    if let Some(line) = stderr
        .lines()
        .rev()
        .find(|l| l.to_lowercase().contains("error") || l.to_lowercase().contains("failed"))
    {
        return truncate(line, 500);
    }

    truncate(stderr.trim(), 500)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let tail_start = s.len() - max;
        s[tail_start..].to_string()
    }
}

/// Moves the original input into the Source's archive directory after a
/// COMPLETED Job. Never changes the Job's terminal status on failure (§4.7
/// step 6, §7 Post-completion error): errors are logged only.
async fn archive_original(input_path: &Path, archive_dir: &Path) {
    if let Err(e) = tokio::fs::create_dir_all(archive_dir).await {
        warn!(error = %e, dir = %archive_dir.display(), "failed to create archive directory");
        return;
    }

    let Some(filename) = input_path.file_name() else {
        return;
    };
    let mut destination = archive_dir.join(filename);

    if tokio::fs::metadata(&destination).await.is_ok() {
        let stem = Path::new(filename).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let ext = Path::new(filename).extension().map(|e| e.to_string_lossy().into_owned());
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let collided_name = match ext {
            Some(ext) => format!("{stem}_{timestamp}.{ext}"),
            None => format!("{stem}_{timestamp}"),
        };
        destination = archive_dir.join(collided_name);
    }

    if let Err(e) = tokio::fs::rename(input_path, &destination).await {
        warn!(error = %e, from = %input_path.display(), to = %destination.display(), "failed to archive original file");
    } else {
        info!(from = %input_path.display(), to = %destination.display(), "archived original file");
    }
}
