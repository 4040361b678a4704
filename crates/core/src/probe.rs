//! Media probing via an external `ffprobe`-compatible tool (§4.7 step 2,
//! §4.8 timecode burn-in).
//!
//! Extends the stream/format shape the teacher's `gates.rs::ffprobe_json`
//! parses with the fields needed to discover duration, frame rate and an
//! embedded source timecode: `tags`, `avg_frame_rate`, `r_frame_rate`.

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStreamInfo {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub avg_frame_rate: Option<f64>,
    pub r_frame_rate: Option<f64>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioStreamInfo {
    pub codec_name: String,
    pub channels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub duration_secs: Option<f64>,
    pub size_bytes: Option<u64>,
    pub tags: HashMap<String, String>,
}

/// A stream that is neither video nor audio (timecode tracks, data streams,
/// subtitles). Kept around only so `timecode()` can still reach a `tmcd`
/// stream's tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtherStreamInfo {
    pub codec_type: String,
    pub codec_name: String,
    pub tags: HashMap<String, String>,
}

impl OtherStreamInfo {
    fn is_tmcd(&self) -> bool {
        self.codec_type == "tmcd" || self.codec_name == "tmcd"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub video_streams: Vec<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub other_streams: Vec<OtherStreamInfo>,
    pub format: FormatInfo,
}

impl ProbeResult {
    /// Best-effort source timecode: format tags first (where MXF/QuickTime
    /// containers usually carry it), then any video stream's tags, then a
    /// `tmcd`-codec stream's tags (some containers carry the timecode only on
    /// a dedicated timecode track ffprobe reports outside `video`/`audio`).
    pub fn timecode(&self) -> Option<&str> {
        self.format
            .tags
            .get("timecode")
            .or_else(|| self.video_streams.iter().find_map(|s| s.tags.get("timecode")))
            .or_else(|| {
                self.other_streams
                    .iter()
                    .filter(|s| s.is_tmcd())
                    .find_map(|s| s.tags.get("timecode"))
            })
            .map(String::as_str)
    }

    /// Frame rate, preferring `avg_frame_rate` over `r_frame_rate` since the
    /// former reflects the stream's actual average rather than its container
    /// time base.
    pub fn frame_rate(&self) -> Option<f64> {
        self.video_streams.first().and_then(|s| s.avg_frame_rate.or(s.r_frame_rate))
    }
}

mod raw {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub channels: Option<u32>,
        pub avg_frame_rate: Option<String>,
        pub r_frame_rate: Option<String>,
        #[serde(default)]
        pub tags: HashMap<String, String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
        #[serde(default)]
        pub tags: HashMap<String, String>,
    }
}

/// Parses an ffprobe rate field of the form `"num/den"` (or a bare integer)
/// into a decimal frames-per-second value.
fn parse_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.parse().ok(),
    }
}

pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeResult, ProbeError> {
    let parsed: raw::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();
    let mut other_streams = Vec::new();

    for stream in parsed.streams.unwrap_or_default() {
        match stream.codec_type.as_deref().unwrap_or("") {
            "video" => video_streams.push(VideoStreamInfo {
                codec_name: stream.codec_name.unwrap_or_default(),
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                avg_frame_rate: stream.avg_frame_rate.as_deref().and_then(parse_rate),
                r_frame_rate: stream.r_frame_rate.as_deref().and_then(parse_rate),
                tags: stream.tags,
            }),
            "audio" => audio_streams.push(AudioStreamInfo {
                codec_name: stream.codec_name.unwrap_or_default(),
                channels: stream.channels.unwrap_or(0),
            }),
            codec_type => other_streams.push(OtherStreamInfo {
                codec_type: codec_type.to_string(),
                codec_name: stream.codec_name.unwrap_or_default(),
                tags: stream.tags,
            }),
        }
    }

    let format = parsed.format.unwrap_or(raw::Format {
        duration: None,
        size: None,
        tags: HashMap::new(),
    });

    Ok(ProbeResult {
        video_streams,
        audio_streams,
        other_streams,
        format: FormatInfo {
            duration_secs: format.duration.as_deref().and_then(|d| d.parse().ok()),
            size_bytes: format.size.as_deref().and_then(|s| s.parse().ok()),
            tags: format.tags,
        },
    })
}

/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`
/// under a bounded timeout (§4.7 step 2: 10s for duration discovery, §4.8:
/// 15s for timecode discovery).
pub async fn probe_file(
    ffprobe_bin: &str,
    path: &Path,
    timeout: Duration,
) -> Result<ProbeResult, ProbeError> {
    let run = Command::new(ffprobe_bin)
        .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output();

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30000/1001",
                "tags": { "timecode": "01:00:00:00" }
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "channels": 2
            }
        ],
        "format": {
            "duration": "120.5",
            "size": "104857600",
            "tags": {}
        }
    }"#;

    #[test]
    fn parses_streams_and_format() {
        let result = parse_ffprobe_output(SAMPLE).unwrap();
        assert_eq!(result.video_streams.len(), 1);
        assert_eq!(result.audio_streams.len(), 1);
        assert_eq!(result.format.duration_secs, Some(120.5));
        assert_eq!(result.format.size_bytes, Some(104_857_600));
    }

    #[test]
    fn frame_rate_prefers_avg_over_r() {
        let result = parse_ffprobe_output(SAMPLE).unwrap();
        let fps = result.frame_rate().unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn timecode_is_read_from_stream_tags() {
        let result = parse_ffprobe_output(SAMPLE).unwrap();
        assert_eq!(result.timecode(), Some("01:00:00:00"));
    }

    #[test]
    fn timecode_falls_back_to_tmcd_stream_with_no_codec_type_key() {
        let json = r#"{
            "streams": [
                {
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080
                },
                {
                    "codec_name": "tmcd",
                    "tags": { "timecode": "10:00:00:00" }
                }
            ],
            "format": {"duration": "1.0", "size": "1", "tags": {}}
        }"#;
        let result = parse_ffprobe_output(json).unwrap();
        assert_eq!(result.video_streams.len(), 0);
        assert_eq!(result.other_streams.len(), 2);
        assert_eq!(result.timecode(), Some("10:00:00:00"));
    }

    #[test]
    fn timecode_absent_returns_none() {
        let json = r#"{"streams": [], "format": {"duration": "1.0", "size": "1"}}"#;
        let result = parse_ffprobe_output(json).unwrap();
        assert_eq!(result.timecode(), None);
    }

    #[test]
    fn parse_rate_handles_fraction_and_zero_denominator() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("not-a-rate"), None);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse_ffprobe_output("{not json").unwrap_err();
        assert!(matches!(err, ProbeError::ParseError(_)));
    }
}
