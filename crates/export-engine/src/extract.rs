//! Segment extraction: one trimmed clip → one normalized intermediate.
//!
//! Every segment leaves here with the same frame size, a constant frame
//! rate, timestamps starting at zero, exactly one video and one audio
//! stream, and uncompressed PCM audio. Lossy audio at this stage would add
//! encoder priming silence at every segment boundary once re-decoded.

use std::path::Path;
use std::sync::Arc;

use splice_common::clock::format_seconds;
use splice_common::config::ExportSettings;
use splice_common::error::SpliceResult;
use splice_timeline_model::{ClipSpec, ProgressThrottle, TargetResolution};

use crate::invoker::{InvokerEvent, TranscodeRequest, Transcoder};

/// Container used for intermediate segments (PCM audio is not valid in MP4).
pub const SEGMENT_EXTENSION: &str = "mkv";

/// Where a segment's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioSource {
    /// The clip's first audio stream.
    #[default]
    Stream,
    /// The clip has no audio; synthesize silence of the same length.
    Silence,
}

/// Transcodes trimmed clips into normalized segments.
#[derive(Clone)]
pub struct SegmentExtractor {
    transcoder: Arc<dyn Transcoder>,
    settings: ExportSettings,
}

impl SegmentExtractor {
    pub fn new(transcoder: Arc<dyn Transcoder>, settings: ExportSettings) -> Self {
        Self {
            transcoder,
            settings,
        }
    }

    /// The invocation that extracts `clip` into `dest`.
    pub fn request(
        &self,
        clip: &ClipSpec,
        dest: &Path,
        target: TargetResolution,
        audio: AudioSource,
    ) -> TranscodeRequest {
        TranscodeRequest {
            label: format!("segment {} ({})", clip.order, clip.label()),
            args: build_extract_args(clip, dest, target, audio, &self.settings),
            output: dest.to_path_buf(),
            expected_duration_secs: clip.trim_duration(),
            timeout: self.settings.segment_timeout(),
        }
    }

    /// Extract one clip. `on_progress` receives local 0–100 values, only
    /// when they rose by at least the configured step.
    pub async fn extract<F>(
        &self,
        clip: &ClipSpec,
        dest: &Path,
        target: TargetResolution,
        audio: AudioSource,
        mut on_progress: F,
    ) -> SpliceResult<()>
    where
        F: FnMut(u8),
    {
        let request = self.request(clip, dest, target, audio);
        tracing::info!(
            clip = clip.order,
            source = %clip.file_path.display(),
            trim_start = clip.trim_start,
            trim_end = clip.trim_end,
            target = %target,
            audio = ?audio,
            dest = %dest.display(),
            "Extracting segment"
        );

        let handle = self.transcoder.invoke(&request)?;
        let mut throttle = ProgressThrottle::new(self.settings.progress_step);
        handle
            .wait(|event| match event {
                InvokerEvent::Progress(snapshot) => {
                    if let Some(percent) = snapshot.percent_u8().and_then(|p| throttle.accept(p)) {
                        on_progress(percent);
                    }
                }
                InvokerEvent::Error(line) => {
                    tracing::warn!(clip = clip.order, "Transcoder reported: {line}");
                }
            })
            .await
    }
}

/// Video filter chain: fit inside the target, pad centered, square pixels,
/// timestamps from zero.
pub fn extract_video_filter(target: TargetResolution) -> String {
    let (w, h) = (target.width, target.height);
    [
        format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
        format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"),
        "setsar=1".to_string(),
        "setpts=PTS-STARTPTS".to_string(),
    ]
    .join(",")
}

/// Full argument list for one extraction.
pub fn build_extract_args(
    clip: &ClipSpec,
    dest: &Path,
    target: TargetResolution,
    audio: AudioSource,
    settings: &ExportSettings,
) -> Vec<String> {
    let duration = format_seconds(clip.trim_duration());
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-ss".into(),
        format_seconds(clip.trim_start),
        "-t".into(),
        duration.clone(),
        "-i".into(),
        clip.file_path.display().to_string(),
    ];

    if audio == AudioSource::Silence {
        args.extend([
            "-f".into(),
            "lavfi".into(),
            "-t".into(),
            duration,
            "-i".into(),
            format!(
                "anullsrc=channel_layout={}:sample_rate={}",
                channel_layout(settings.audio_channels),
                settings.audio_sample_rate
            ),
        ]);
    }

    args.extend([
        "-vf".into(),
        extract_video_filter(target),
        "-af".into(),
        "asetpts=PTS-STARTPTS".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        settings.preset.clone(),
        "-crf".into(),
        settings.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        settings.audio_sample_rate.to_string(),
        "-ac".into(),
        settings.audio_channels.to_string(),
        "-r".into(),
        settings.frame_rate.to_string(),
        "-vsync".into(),
        "cfr".into(),
        "-fflags".into(),
        "+genpts".into(),
        "-async".into(),
        "1".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
    ]);
    args.push(match audio {
        AudioSource::Stream => "0:a:0?".into(),
        AudioSource::Silence => "1:a:0".into(),
    });
    args.extend([
        "-f".into(),
        "matroska".into(),
        dest.display().to_string(),
    ]);

    args
}

fn channel_layout(channels: u32) -> &'static str {
    match channels {
        1 => "mono",
        _ => "stereo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn test_extract_args_trim_and_normalize() {
        let clip = ClipSpec::new("/media/a.mov", 2.5, 7.0, 1280, 720, 0);
        let target = TargetResolution::even(1920, 1080);
        let dest = PathBuf::from("/tmp/segment-0.mkv");
        let args = build_extract_args(
            &clip,
            &dest,
            target,
            AudioSource::Stream,
            &ExportSettings::default(),
        );

        assert_eq!(arg_after(&args, "-ss"), "2.500");
        assert_eq!(arg_after(&args, "-t"), "4.500");
        assert_eq!(arg_after(&args, "-i"), "/media/a.mov");
        assert_eq!(
            arg_after(&args, "-vf"),
            "scale=1920:1080:force_original_aspect_ratio=decrease,\
             pad=1920:1080:(ow-iw)/2:(oh-ih)/2,setsar=1,setpts=PTS-STARTPTS"
        );
        assert_eq!(arg_after(&args, "-af"), "asetpts=PTS-STARTPTS");
        assert_eq!(arg_after(&args, "-c:a"), "pcm_s16le");
        assert_eq!(arg_after(&args, "-r"), "30");
        assert_eq!(arg_after(&args, "-vsync"), "cfr");
        assert!(args.iter().any(|a| a == "0:a:0?"));
        assert_eq!(args.last().unwrap(), "/tmp/segment-0.mkv");
        // seek must precede the input for fast, frame-accurate trimming
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
    }

    #[test]
    fn test_extract_args_synthesize_silence_without_audio() {
        let clip = ClipSpec::new("/media/screen.mp4", 0.0, 3.0, 1920, 1080, 1);
        let args = build_extract_args(
            &clip,
            Path::new("/tmp/s.mkv"),
            TargetResolution::even(1920, 1080),
            AudioSource::Silence,
            &ExportSettings::default(),
        );

        assert!(args
            .iter()
            .any(|a| a == "anullsrc=channel_layout=stereo:sample_rate=48000"));
        assert!(args.iter().any(|a| a == "1:a:0"));
        assert!(!args.iter().any(|a| a == "0:a:0?"));
    }

    #[test]
    fn test_request_carries_duration_and_timeout() {
        struct Never;
        impl Transcoder for Never {
            fn invoke(
                &self,
                _request: &TranscodeRequest,
            ) -> SpliceResult<crate::invoker::InvocationHandle> {
                Err(splice_common::error::SpliceError::unclassified("unused"))
            }
            fn is_available(&self) -> bool {
                false
            }
            fn name(&self) -> &str {
                "never"
            }
        }

        let extractor = SegmentExtractor::new(Arc::new(Never), ExportSettings::default());
        let clip = ClipSpec::new("/media/a.mov", 1.0, 4.0, 640, 480, 3);
        let request = extractor.request(
            &clip,
            Path::new("/tmp/x.mkv"),
            TargetResolution::even(640, 480),
            AudioSource::Stream,
        );
        assert_eq!(request.label, "segment 3 (a.mov)");
        assert!((request.expected_duration_secs - 3.0).abs() < 1e-9);
        assert_eq!(request.timeout, std::time::Duration::from_secs(60));
    }
}
