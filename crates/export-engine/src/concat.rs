//! Segment concatenation: normalized segments → final output.
//!
//! Segments share frame size, frame rate and timestamp base, so a single
//! `concat` filter graph can reference each input by index. A container-level
//! concat would instead trip over small stream-parameter differences. This is
//! the only pass that compresses audio.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use splice_common::config::ExportSettings;
use splice_common::error::{SpliceError, SpliceResult};
use splice_timeline_model::ProgressThrottle;

use crate::invoker::{InvokerEvent, TranscodeRequest, Transcoder};

/// Joins segments into the output file.
#[derive(Clone)]
pub struct SegmentConcatenator {
    transcoder: Arc<dyn Transcoder>,
    settings: ExportSettings,
}

impl SegmentConcatenator {
    pub fn new(transcoder: Arc<dyn Transcoder>, settings: ExportSettings) -> Self {
        Self {
            transcoder,
            settings,
        }
    }

    /// The invocation joining `segments` (in order) into `dest`.
    pub fn request(
        &self,
        segments: &[PathBuf],
        dest: &Path,
        expected_duration_secs: f64,
    ) -> TranscodeRequest {
        TranscodeRequest {
            label: format!("concatenation of {} segment(s)", segments.len()),
            args: build_concat_args(segments, dest, &self.settings),
            output: dest.to_path_buf(),
            expected_duration_secs,
            timeout: self.settings.concat_timeout(),
        }
    }

    /// Concatenate. Reports 0 before starting and 100 after a successful
    /// exit regardless of what the transcoder printed in between.
    pub async fn concatenate<F>(
        &self,
        segments: &[PathBuf],
        dest: &Path,
        expected_duration_secs: f64,
        mut on_progress: F,
    ) -> SpliceResult<()>
    where
        F: FnMut(u8),
    {
        if segments.is_empty() {
            return Err(SpliceError::invalid_input("no segments to concatenate"));
        }

        let request = self.request(segments, dest, expected_duration_secs);
        tracing::info!(
            segments = segments.len(),
            dest = %dest.display(),
            expected_duration_secs,
            "Concatenating segments"
        );

        let mut throttle = ProgressThrottle::new(self.settings.progress_step);
        if let Some(percent) = throttle.force(0) {
            on_progress(percent);
        }

        let handle = self.transcoder.invoke(&request)?;
        handle
            .wait(|event| match event {
                InvokerEvent::Progress(snapshot) => {
                    if let Some(percent) = snapshot.percent_u8().and_then(|p| throttle.accept(p)) {
                        on_progress(percent);
                    }
                }
                InvokerEvent::Error(line) => {
                    tracing::warn!("Transcoder reported during concatenation: {line}");
                }
            })
            .await?;

        if let Some(percent) = throttle.force(100) {
            on_progress(percent);
        }
        Ok(())
    }
}

/// `[0:v][0:a][1:v][1:a]…concat=n=N:v=1:a=1[vcat][acat]`
pub fn concat_filter_graph(segment_count: usize) -> String {
    let mut graph = String::new();
    for index in 0..segment_count {
        graph.push_str(&format!("[{index}:v][{index}:a]"));
    }
    graph.push_str(&format!("concat=n={segment_count}:v=1:a=1[vcat][acat]"));
    graph
}

/// Full argument list for the concatenation pass.
pub fn build_concat_args(
    segments: &[PathBuf],
    dest: &Path,
    settings: &ExportSettings,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
    for segment in segments {
        args.push("-i".into());
        args.push(segment.display().to_string());
    }

    args.extend([
        "-filter_complex".into(),
        concat_filter_graph(segments.len()),
        "-map".into(),
        "[vcat]".into(),
        "-map".into(),
        "[acat]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        settings.preset.clone(),
        "-crf".into(),
        settings.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", settings.audio_bitrate_kbps),
        "-ar".into(),
        settings.audio_sample_rate.to_string(),
        "-ac".into(),
        settings.audio_channels.to_string(),
        "-r".into(),
        settings.frame_rate.to_string(),
        "-fflags".into(),
        "+genpts".into(),
        "-async".into(),
        "1".into(),
    ]);

    if wants_faststart(dest) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }

    args.push(dest.display().to_string());
    args
}

fn wants_faststart(dest: &Path) -> bool {
    dest.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "mp4" | "m4v" | "mov"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_graph_references_every_input() {
        assert_eq!(
            concat_filter_graph(2),
            "[0:v][0:a][1:v][1:a]concat=n=2:v=1:a=1[vcat][acat]"
        );
        assert_eq!(
            concat_filter_graph(1),
            "[0:v][0:a]concat=n=1:v=1:a=1[vcat][acat]"
        );
    }

    #[test]
    fn test_concat_args_keep_segment_order() {
        let segments = vec![
            PathBuf::from("/tmp/seg-a.mkv"),
            PathBuf::from("/tmp/seg-b.mkv"),
            PathBuf::from("/tmp/seg-c.mkv"),
        ];
        let args = build_concat_args(
            &segments,
            Path::new("/out/final.mp4"),
            &ExportSettings::default(),
        );

        let inputs: Vec<&str> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_str() == "-i")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(inputs, vec!["/tmp/seg-a.mkv", "/tmp/seg-b.mkv", "/tmp/seg-c.mkv"]);
        assert!(args.iter().any(|a| a == "aac"));
        assert!(args.iter().any(|a| a == "192k"));
        assert!(args.iter().any(|a| a == "+faststart"));
        assert_eq!(args.last().unwrap(), "/out/final.mp4");
    }

    #[test]
    fn test_faststart_only_for_mp4_family() {
        let args = build_concat_args(
            &[PathBuf::from("/tmp/s.mkv")],
            Path::new("/out/final.mkv"),
            &ExportSettings::default(),
        );
        assert!(!args.iter().any(|a| a == "-movflags"));
    }

    #[test]
    fn test_audio_bitrate_follows_settings() {
        let settings = ExportSettings {
            audio_bitrate_kbps: 48,
            ..Default::default()
        };
        let args = build_concat_args(
            &[PathBuf::from("/tmp/s.mkv")],
            Path::new("/out/final.mp4"),
            &settings,
        );
        let idx = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[idx + 1], "48k");
    }
}
