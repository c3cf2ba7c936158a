//! Media metadata probing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};
use tokio::process::Command;

/// What the export pipeline needs to know about a media file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Codec of the first video stream.
    pub codec: String,
    pub has_audio: bool,
    pub frame_rate: Option<f64>,
}

/// Metadata source consulted before and after an export.
///
/// Callers bound the lookup with a timeout and may drop the future at any
/// point; implementations must not leave work running after that.
#[async_trait::async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> SpliceResult<MediaInfo>;
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
///
/// The child is killed if the lookup future is dropped before it exits.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> SpliceResult<MediaInfo> {
        let child = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpliceError::probe(format!("Failed to run {}: {e}", self.binary.display()))
            })?;

        let output = child.wait_with_output().await.map_err(|e| {
            SpliceError::probe(format!("Failed to read {} output: {e}", self.binary.display()))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpliceError::probe(format!(
                "ffprobe failed for {} ({}): {}",
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        let info = parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| SpliceError::probe(format!("{}: {e}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            duration_secs = info.duration_secs,
            width = info.width,
            height = info.height,
            codec = %info.codec,
            has_audio = info.has_audio,
            "Probed media"
        );
        Ok(info)
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_ffprobe_json(json: &str) -> SpliceResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;
    let streams = probe.streams.unwrap_or_default();

    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| SpliceError::probe("no video stream"))?;
    let has_audio = streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let width = video.width.filter(|w| *w > 0);
    let height = video.height.filter(|h| *h > 0);
    let (Some(width), Some(height)) = (width, height) else {
        return Err(SpliceError::probe("video stream has no frame size"));
    };

    // Prefer the container duration; fall back to the video stream.
    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| SpliceError::probe("duration unavailable"))?;

    Ok(MediaInfo {
        duration_secs,
        width,
        height,
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        has_audio,
        frame_rate: video.r_frame_rate.as_deref().and_then(parse_frame_rate),
    })
}

/// Parse a rational frame rate such as `30000/1001` or `25`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0).then(|| num / den);
    }
    rate.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "duration": "12.000000"},
            {"codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {"duration": "12.046000"}
    }"#;

    #[test]
    fn test_parse_full_probe() {
        let info = parse_ffprobe_json(SAMPLE).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.codec, "h264");
        assert!(info.has_audio);
        assert!((info.duration_secs - 12.046).abs() < 1e-9);
        assert!((info.frame_rate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_video_only_falls_back_to_stream_duration() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "vp9",
            "width": 640, "height": 480, "duration": "3.5"}], "format": {}}"#;
        let info = parse_ffprobe_json(json).unwrap();
        assert!(!info.has_audio);
        assert!((info.duration_secs - 3.5).abs() < 1e-9);
        assert_eq!(info.frame_rate, None);
    }

    #[test]
    fn test_parse_rejects_audio_only() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "1.0"}}"#;
        assert!(parse_ffprobe_json(json).is_err());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }
}
