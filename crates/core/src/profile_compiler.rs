//! Translates a Profile into the external tool's argv (§4.8).
//!
//! Grounded on `transcoder_worker.py`'s `_build_ffmpeg_command` and its
//! private helpers (`_sanitize_ffmpeg_params_string`, `_build_timecode_drawtext`,
//! `_escape_timecode_for_drawtext`, `_inject_drawtext_into_params`). Tested
//! the way the teacher's `encode/av1an.rs` tests argv construction: assert
//! on the produced `Vec<String>` without executing anything.

use crate::error::CompileError;
use crate::probe::{self, ProbeResult};
use crate::store::Profile;
use std::path::Path;
use std::time::Duration;

/// Compound profile name that triggers source-timecode burn-in (§4.8).
pub const TIMECODE_BURNIN_PROFILE: &str = "H264_LOWRES_TC";

const DRAWTEXT_FONTFILE: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf";

/// Builds the full argv for invoking the external media tool on one Job.
///
/// `probe` is only consulted for the `H264_LOWRES_TC` compound profile; pass
/// `None` when the caller hasn't needed to probe (non-burn-in profiles never
/// touch it, keeping compilation a pure function of its inputs per §8).
pub fn compile_argv(
    tool_bin: &str,
    profile: &Profile,
    input_path: &Path,
    output_path: &Path,
    probe: Option<&ProbeResult>,
) -> Result<Vec<String>, CompileError> {
    let mut argv = vec![
        tool_bin.to_string(),
        "-i".to_string(),
        input_path.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        profile.video_codec.clone(),
        "-b:v".to_string(),
        profile.video_bitrate.clone(),
        "-c:a".to_string(),
        profile.audio_codec.clone(),
    ];

    if let Some(audio_bitrate) = &profile.audio_bitrate {
        argv.push("-b:a".to_string());
        argv.push(audio_bitrate.clone());
    }

    argv.push("-ar".to_string());
    argv.push(profile.audio_sample_rate.clone());
    argv.push("-ac".to_string());
    argv.push(profile.audio_channels.clone());

    let mut extra = match &profile.extra_args {
        Some(raw) => tokenize_extra_args(raw),
        None => Vec::new(),
    };

    if profile.name == TIMECODE_BURNIN_PROFILE {
        let probe = probe.ok_or_else(|| {
            CompileError::Probe(crate::error::ProbeError::ParseError(
                "H264_LOWRES_TC requires a probe result to burn in the source timecode".to_string(),
            ))
        })?;
        let drawtext = build_timecode_drawtext(probe);
        extra = inject_drawtext(extra, &drawtext);
    }

    argv.extend(extra);
    argv.push("-y".to_string());
    argv.push(output_path.to_string_lossy().into_owned());

    Ok(argv)
}

/// Probes `input_path` with the bound the timecode/fps discovery step needs
/// (§4.8 step 3: 15 s). Separate from duration discovery (§4.7 step 3, 10 s)
/// since the two serve different call sites with different timeouts.
pub async fn probe_for_burnin(ffprobe_bin: &str, input_path: &Path) -> Result<ProbeResult, CompileError> {
    probe::probe_file(ffprobe_bin, input_path, Duration::from_secs(15))
        .await
        .map_err(CompileError::Probe)
}

/// Sanitizes shell-style line continuations then tokenizes by quoting rules
/// (§4.8). CRLF and bare backslash-continuations collapse to spaces; a
/// backslash before `:` is left untouched since drawtext and other filters
/// rely on it as an escape.
fn tokenize_extra_args(raw: &str) -> Vec<String> {
    let sanitized = sanitize_extra_args_string(raw);
    if sanitized.is_empty() {
        return Vec::new();
    }
    let tokens = shell_words::split(&sanitized).unwrap_or_default();
    tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "\\")
        .collect()
}

fn sanitize_extra_args_string(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let mut out = String::with_capacity(normalized.len());
    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            // Backslash before ':' is a filtergraph escape; keep it verbatim.
            if chars.get(i + 1) == Some(&':') {
                out.push(c);
                i += 1;
                continue;
            }
            // Backslash line-continuation: swallow backslash + following
            // whitespace/newline, collapsing the run to a single space.
            let mut j = i + 1;
            let mut saw_ws = false;
            while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t' || chars[j] == '\n') {
                saw_ws = true;
                j += 1;
            }
            if saw_ws {
                out.push(' ');
                i = j;
                continue;
            }
        }
        out.push(if c == '\n' { ' ' } else { c });
        i += 1;
    }
    out.trim().to_string()
}

/// `drawtext=...` filter burning in the source's embedded timecode (§4.8).
fn build_timecode_drawtext(probe: &ProbeResult) -> String {
    let timecode = probe
        .timecode()
        .map(|tc| tc.replace(';', ":"))
        .unwrap_or_else(|| "00:00:00:00".to_string());
    let fps = probe.frame_rate();

    let mut parts = Vec::new();
    if Path::new(DRAWTEXT_FONTFILE).exists() {
        parts.push(format!("fontfile={DRAWTEXT_FONTFILE}"));
    } else {
        parts.push("font=monospace".to_string());
    }
    parts.push(format!("timecode='{}'", escape_timecode(&timecode)));
    parts.push(format!("r={}", format_fps(fps)));
    parts.push("fontsize=36".to_string());
    parts.push("fontcolor=white".to_string());
    parts.push("box=1".to_string());
    parts.push("boxcolor=0x00000099".to_string());
    parts.push("x=40".to_string());
    parts.push("y=40".to_string());

    format!("drawtext={}", parts.join(":"))
}

fn escape_timecode(timecode: &str) -> String {
    timecode.replace(':', "\\:")
}

fn format_fps(fps: Option<f64>) -> String {
    match fps {
        Some(f) if f > 0.0 => {
            if (f - f.round()).abs() < 1e-6 {
                format!("{}", f.round() as i64)
            } else {
                let s = format!("{f:.3}");
                s.trim_end_matches('0').trim_end_matches('.').to_string()
            }
        }
        _ => "25".to_string(),
    }
}

/// Appends the drawtext filter to an existing `-vf`/`-filter:v`/`-filter_complex`
/// argument, or adds a new `-vf <filter>` pair if none is present (§4.8 step 4).
fn inject_drawtext(mut params: Vec<String>, drawtext_filter: &str) -> Vec<String> {
    if params.is_empty() {
        return vec!["-vf".to_string(), drawtext_filter.to_string()];
    }

    for key in ["-vf", "-filter:v", "-filter_complex"] {
        if let Some(idx) = params.iter().position(|p| p == key) {
            match params.get(idx + 1) {
                None => {
                    params.push(drawtext_filter.to_string());
                    return params;
                }
                Some(current) if current.contains("drawtext=") => {
                    return params;
                }
                Some(current) => {
                    params[idx + 1] = format!("{current},{drawtext_filter}");
                    return params;
                }
            }
        }
    }

    params.push("-vf".to_string());
    params.push(drawtext_filter.to_string());
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioStreamInfo, FormatInfo, VideoStreamInfo};
    use std::collections::HashMap;

    fn test_profile(name: &str) -> Profile {
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
            container: "mp4".to_string(),
            extra_args: None,
        }
    }

    #[test]
    fn compile_argv_builds_base_template() {
        let profile = test_profile("STANDARD");
        let argv = compile_argv(
            "ffmpeg",
            &profile,
            Path::new("/in/clip.mov"),
            Path::new("/out/clip.mp4"),
            None,
        )
        .unwrap();

        assert_eq!(
            argv,
            vec![
                "ffmpeg", "-i", "/in/clip.mov", "-c:v", "libx264", "-b:v", "2M", "-c:a", "aac",
                "-b:a", "128k", "-ar", "48000", "-ac", "2", "-y", "/out/clip.mp4",
            ]
        );
    }

    #[test]
    fn compile_argv_omits_audio_bitrate_when_absent() {
        let mut profile = test_profile("STANDARD");
        profile.audio_bitrate = None;
        let argv = compile_argv("ffmpeg", &profile, Path::new("/in/a.mov"), Path::new("/out/a.mp4"), None).unwrap();
        assert!(!argv.contains(&"-b:a".to_string()));
    }

    #[test]
    fn tokenize_extra_args_collapses_backslash_continuation() {
        let tokens = tokenize_extra_args("-preset fast \\\n -crf 23");
        assert_eq!(tokens, vec!["-preset", "fast", "-crf", "23"]);
    }

    #[test]
    fn tokenize_extra_args_preserves_filtergraph_escape() {
        let tokens = tokenize_extra_args(r#"-vf "drawtext=timecode='01\:00\:00\:00'""#);
        assert_eq!(tokens, vec!["-vf", r#"drawtext=timecode='01\:00\:00\:00'"#]);
    }

    #[test]
    fn compile_argv_requires_probe_for_burnin_profile() {
        let profile = test_profile(TIMECODE_BURNIN_PROFILE);
        let err = compile_argv("ffmpeg", &profile, Path::new("/in/a.mov"), Path::new("/out/a.mp4"), None)
            .unwrap_err();
        assert!(matches!(err, CompileError::Probe(_)));
    }

    fn probe_with_timecode(timecode: &str, rate: &str) -> ProbeResult {
        let mut tags = HashMap::new();
        tags.insert("timecode".to_string(), timecode.to_string());
        ProbeResult {
            video_streams: vec![VideoStreamInfo {
                codec_name: "h264".to_string(),
                width: 1920,
                height: 1080,
                avg_frame_rate: probe::parse_ffprobe_output(&format!(
                    r#"{{"streams":[{{"codec_type":"video","avg_frame_rate":"{rate}"}}],"format":{{}}}}"#
                ))
                .unwrap()
                .video_streams[0]
                    .avg_frame_rate,
                r_frame_rate: None,
                tags,
            }],
            audio_streams: vec![AudioStreamInfo { codec_name: "aac".to_string(), channels: 2 }],
            other_streams: vec![],
            format: FormatInfo { duration_secs: Some(10.0), size_bytes: Some(100), tags: HashMap::new() },
        }
    }

    #[test]
    fn timecode_burnin_produces_single_vf_token_with_escaped_timecode() {
        let profile = test_profile(TIMECODE_BURNIN_PROFILE);
        let probe = probe_with_timecode("15:51:00:21", "25/1");
        let argv = compile_argv(
            "ffmpeg",
            &profile,
            Path::new("/in/a.mov"),
            Path::new("/out/a.mp4"),
            Some(&probe),
        )
        .unwrap();

        let vf_idx = argv.iter().position(|a| a == "-vf").expect("expected one -vf token");
        assert_eq!(argv.iter().filter(|a| *a == "-vf").count(), 1);
        let value = &argv[vf_idx + 1];
        assert!(value.starts_with("drawtext="));
        assert!(value.contains(r#"timecode='15\:51\:00\:21'"#));
        assert!(value.contains("r=25"));
    }

    #[test]
    fn timecode_burnin_falls_back_to_zero_timecode_and_25fps_when_absent() {
        let profile = test_profile(TIMECODE_BURNIN_PROFILE);
        let probe = ProbeResult {
            video_streams: vec![],
            audio_streams: vec![],
            other_streams: vec![],
            format: FormatInfo { duration_secs: None, size_bytes: None, tags: HashMap::new() },
        };
        let argv = compile_argv("ffmpeg", &profile, Path::new("/in/a.mov"), Path::new("/out/a.mp4"), Some(&probe))
            .unwrap();
        let vf_idx = argv.iter().position(|a| a == "-vf").unwrap();
        assert!(argv[vf_idx + 1].contains(r#"timecode='00\:00\:00\:00'"#));
        assert!(argv[vf_idx + 1].contains("r=25"));
    }

    #[test]
    fn inject_drawtext_appends_to_existing_vf_filterchain() {
        let params = vec!["-vf".to_string(), "scale=1280:-1".to_string()];
        let result = inject_drawtext(params, "drawtext=timecode='00\\:00\\:00\\:00':r=25");
        assert_eq!(result[1], "scale=1280:-1,drawtext=timecode='00\\:00\\:00\\:00':r=25");
    }

    #[test]
    fn inject_drawtext_skips_when_drawtext_already_present() {
        let params = vec!["-vf".to_string(), "drawtext=existing".to_string()];
        let result = inject_drawtext(params.clone(), "drawtext=new");
        assert_eq!(result, params);
    }

    #[test]
    fn format_fps_renders_integers_without_decimals() {
        assert_eq!(format_fps(Some(25.0)), "25");
        assert_eq!(format_fps(None), "25");
    }

    #[test]
    fn format_fps_renders_fractional_rates_trimmed() {
        assert_eq!(format_fps(Some(29.97)), "29.97");
    }
}
