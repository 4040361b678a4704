//! Turns a discovered candidate file into a queued Job (§4.5).
//!
//! Shared by `local_watcher` and `remote_watcher`: both hand a candidate
//! (Source, filename, local path, size) here and get back a Job, created or
//! an existing non-terminal one reused. Output path composition and dedup
//! are the one thing both watchers must agree on, so it lives in one place
//! rather than being duplicated per transport.

use crate::error::JobFactoryError;
use crate::store::{Job, Profile, Source, Store};
use std::path::{Path, PathBuf};

/// Resolves a Source's output directory, composes the output filename from
/// its Profile (or the `default`/`mxf` fallback), and records the Job.
///
/// Output filename: `<base>_<profile_name_lowercased_with_spaces_as_underscores>.<container>`,
/// or `<base>_default.mxf` when the Source has no Profile.
pub fn materialize_job(
    store: &Store,
    source: &Source,
    profile: Option<&Profile>,
    filename: &str,
    input_path: &Path,
    input_size_bytes: Option<u64>,
) -> Result<Job, JobFactoryError> {
    let output_dir = resolve_output_dir(source, input_path);
    ensure_writable_dir(&output_dir)?;

    let output_filename = compose_output_filename(filename, profile);
    let output_path = output_dir.join(&output_filename);

    let job = store.insert_job_if_absent(
        source.id,
        source.profile_id,
        filename,
        &input_path.to_string_lossy(),
        &output_path.to_string_lossy(),
        input_size_bytes,
    )?;
    Ok(job)
}

fn resolve_output_dir(source: &Source, input_path: &Path) -> PathBuf {
    match &source.output_path {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

fn ensure_writable_dir(dir: &Path) -> Result<(), JobFactoryError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| JobFactoryError::OutputDirCreation {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    if is_read_only(dir) {
        return Err(JobFactoryError::OutputDirNotWritable(dir.to_path_buf()));
    }
    Ok(())
}

#[cfg(unix)]
fn is_read_only(dir: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(dir)
        .map(|m| m.permissions().mode() & 0o200 == 0)
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_read_only(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| m.permissions().readonly())
        .unwrap_or(true)
}

fn compose_output_filename(filename: &str, profile: Option<&Profile>) -> String {
    let base = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    match profile {
        Some(p) => {
            let slug = p.name.to_lowercase().replace(' ', "_");
            format!("{base}_{slug}.{}", p.container)
        }
        None => format!("{base}_default.mxf"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SourceKind, SourceStatus};
    use chrono::Utc;

    fn test_source(output_path: Option<&str>) -> Source {
        Source {
            id: 1,
            name: "watch1".to_string(),
            kind: SourceKind::Local,
            local_path: Some("/watch".to_string()),
            host: None,
            port: None,
            username: None,
            password: None,
            remote_path: None,
            staging_path: None,
            output_path: output_path.map(str::to_string),
            archive_path: None,
            profile_id: None,
            active: true,
            status: SourceStatus::Idle,
            created_at: Utc::now(),
        }
    }

    fn test_profile(name: &str, container: &str) -> Profile {
        Profile {
            id: 1,
            name: name.to_string(),
            description: None,
            video_codec: "libx264".to_string(),
            video_bitrate: "2M".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: Some("128k".to_string()),
            audio_sample_rate: "48000".to_string(),
            audio_channels: "2".to_string(),
            container: container.to_string(),
            extra_args: None,
        }
    }

    #[test]
    fn compose_output_filename_uses_default_mxf_without_profile() {
        let name = compose_output_filename("clip.mov", None);
        assert_eq!(name, "clip_default.mxf");
    }

    #[test]
    fn compose_output_filename_lowercases_and_replaces_spaces_in_profile_name() {
        let profile = test_profile("H264 LowRes TC", "mp4");
        let name = compose_output_filename("clip.mov", Some(&profile));
        assert_eq!(name, "clip_h264_lowres_tc.mp4");
    }

    #[test]
    fn resolve_output_dir_falls_back_to_input_parent_when_source_has_none() {
        let source = test_source(None);
        let dir = resolve_output_dir(&source, Path::new("/watch/clip.mov"));
        assert_eq!(dir, PathBuf::from("/watch"));
    }

    #[test]
    fn resolve_output_dir_prefers_source_output_path() {
        let source = test_source(Some("/out"));
        let dir = resolve_output_dir(&source, Path::new("/watch/clip.mov"));
        assert_eq!(dir, PathBuf::from("/out"));
    }

    #[test]
    fn materialize_job_is_idempotent_for_same_filename() {
        let store = Store::open_in_memory().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let mut source = test_source(Some(tmp.path().to_str().unwrap()));
        source.id = store.create_source(&source).unwrap();

        let input_path = tmp.path().join("clip.mov");
        std::fs::write(&input_path, b"data").unwrap();

        let j1 = materialize_job(&store, &source, None, "clip.mov", &input_path, Some(4)).unwrap();
        let j2 = materialize_job(&store, &source, None, "clip.mov", &input_path, Some(4)).unwrap();
        assert_eq!(j1.id, j2.id);
    }
}
