//! Timeline export orchestration.
//!
//! [`TimelineExporter`] drives one job through a fixed sequence of phases:
//!
//! ```text
//! Validating ─▶ Extracting(0) ─▶ … ─▶ Extracting(n-1) ─▶ Concatenating ─▶ Finalizing ─▶ Done
//!      │               │                                       │                │
//!      └───────────────┴──────────────── Failed ◀──────────────┴────────────────┘
//! ```
//!
//! Every phase owns a window of the global 0–100 progress scale. Whatever
//! happens, intermediates are released through a single cleanup path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use splice_common::clock::unique_stamp;
use splice_common::config::ExportSettings;
use splice_common::error::{SpliceError, SpliceResult};
use splice_timeline_model::{
    sort_by_order, total_duration, ClipSpec, MonotonicProgress, ProgressWindow, TargetResolution,
    CONCAT_WINDOW, EXTRACT_WINDOW, FINALIZE_WINDOW,
};

use crate::concat::SegmentConcatenator;
use crate::extract::{AudioSource, SegmentExtractor, SEGMENT_EXTENSION};
use crate::invoker::{TranscodeRequest, Transcoder};
use crate::probe::{MediaInfo, MediaProbe};
use crate::temp::TempFileManager;

/// Prefix of intermediate segment file names.
const SEGMENT_PREFIX: &str = "splice-segment";

/// Output duration drift tolerated before finalization warns.
const DURATION_DRIFT_WARN_SECS: f64 = 0.5;

/// Where an export job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Validating,
    /// Extracting the clip at this index of the sorted clip list.
    Extracting(usize),
    Concatenating,
    Finalizing,
    Done,
    Failed,
}

impl ExportPhase {
    /// The phase following a successful `self`.
    ///
    /// `Done` and `Failed` are terminal and map to themselves.
    pub fn next(self, clip_count: usize) -> Self {
        match self {
            Self::Validating if clip_count == 0 => Self::Failed,
            Self::Validating => Self::Extracting(0),
            Self::Extracting(index) if index + 1 < clip_count => Self::Extracting(index + 1),
            Self::Extracting(_) => Self::Concatenating,
            Self::Concatenating => Self::Finalizing,
            Self::Finalizing => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    /// The slice of the global progress scale this phase reports into.
    pub fn window(self, clip_count: usize) -> Option<ProgressWindow> {
        match self {
            Self::Validating => Some(ProgressWindow::new(0.0, EXTRACT_WINDOW.start_percent)),
            Self::Extracting(index) => Some(EXTRACT_WINDOW.slice(index, clip_count)),
            Self::Concatenating => Some(CONCAT_WINDOW),
            Self::Finalizing => Some(FINALIZE_WINDOW),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Extracting(index) => write!(f, "extracting segment {}", index + 1),
            Self::Concatenating => write!(f, "concatenating"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An intermediate produced from one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source_clip: ClipSpec,
    pub temp_path: PathBuf,
}

/// A validated job, ready to run.
#[derive(Debug)]
struct PreparedJob {
    clips: Vec<ClipSpec>,
    audio: Vec<AudioSource>,
    target: TargetResolution,
    expected_duration_secs: f64,
}

/// Mutable bookkeeping of a running job, inspected by the cleanup path.
#[derive(Debug)]
struct ExportState {
    phase: ExportPhase,
    segments: Vec<Segment>,
    output_started: bool,
}

impl Default for ExportState {
    fn default() -> Self {
        Self {
            phase: ExportPhase::Validating,
            segments: vec![],
            output_started: false,
        }
    }
}

/// Forwards global progress to the caller, never backwards, never twice.
struct ProgressReporter<F> {
    sink: F,
    filter: MonotonicProgress,
}

impl<F: FnMut(u8)> ProgressReporter<F> {
    fn new(sink: F) -> Self {
        Self {
            sink,
            filter: MonotonicProgress::new(),
        }
    }

    fn report(&mut self, percent: u8) {
        if let Some(percent) = self.filter.advance(percent) {
            tracing::trace!(percent, "Export progress");
            (self.sink)(percent);
        }
    }

    fn enter(&mut self, window: Option<ProgressWindow>) {
        if let Some(window) = window {
            self.report(window.map_percent(0));
        }
    }
}

/// Turns an ordered list of trimmed clips into one video file.
pub struct TimelineExporter {
    extractor: SegmentExtractor,
    concatenator: SegmentConcatenator,
    probe: Option<Arc<dyn MediaProbe>>,
    settings: ExportSettings,
}

impl TimelineExporter {
    pub fn new(transcoder: Arc<dyn Transcoder>, settings: ExportSettings) -> Self {
        Self {
            extractor: SegmentExtractor::new(Arc::clone(&transcoder), settings.clone()),
            concatenator: SegmentConcatenator::new(transcoder, settings.clone()),
            probe: None,
            settings,
        }
    }

    /// Consult `probe` for source durations, audio presence and the final
    /// output duration.
    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Export `clips` to `output_path`.
    ///
    /// `on_progress` receives a non-decreasing percentage, ending with 100
    /// on success. On failure every intermediate and any partially written
    /// output are removed, and the returned error is already classified.
    pub async fn export<F>(
        &self,
        clips: &[ClipSpec],
        output_path: impl AsRef<Path>,
        on_progress: F,
    ) -> SpliceResult<PathBuf>
    where
        F: FnMut(u8),
    {
        let output = output_path.as_ref().to_path_buf();
        let started = Instant::now();
        let mut reporter = ProgressReporter::new(on_progress);
        let mut temp = TempFileManager::new(self.settings.temp_root(), SEGMENT_EXTENSION);
        let mut state = ExportState::default();

        tracing::info!(
            clips = clips.len(),
            output = %output.display(),
            "Starting timeline export"
        );
        reporter.report(0);

        let result = self
            .run(clips, &output, &mut temp, &mut state, &mut reporter)
            .await;

        let removed = temp.release_all();
        tracing::debug!(removed, "Released intermediate files");

        match result {
            Ok(()) => {
                state.phase = ExportPhase::Done;
                tracing::info!(
                    output = %output.display(),
                    segments = state.segments.len(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Timeline export finished"
                );
                Ok(output)
            }
            Err(err) => {
                let failed_in = state.phase;
                state.phase = ExportPhase::Failed;
                let err = err.classify();
                if state.output_started {
                    remove_partial_output(&output);
                }
                tracing::error!(
                    phase = %failed_in,
                    kind = %err.kind(),
                    error = %err,
                    "Timeline export failed"
                );
                Err(err)
            }
        }
    }

    /// Every transcoder invocation `export` would run, without running any.
    ///
    /// Sources are assumed to carry audio and intermediate names are
    /// illustrative; the filesystem is not touched.
    pub fn plan(
        &self,
        clips: &[ClipSpec],
        output_path: impl AsRef<Path>,
    ) -> SpliceResult<Vec<TranscodeRequest>> {
        let (sorted, target) = validate_clips(clips)?;
        let output = output_path.as_ref();
        let mut temp = TempFileManager::new(self.settings.temp_root(), SEGMENT_EXTENSION);

        let mut requests = Vec::with_capacity(sorted.len() + 1);
        let mut segments = Vec::with_capacity(sorted.len());
        for clip in &sorted {
            let dest = temp.allocate(SEGMENT_PREFIX);
            requests.push(
                self.extractor
                    .request(clip, &dest, target, AudioSource::Stream),
            );
            segments.push(dest);
        }
        requests.push(
            self.concatenator
                .request(&segments, output, total_duration(&sorted)),
        );
        Ok(requests)
    }

    async fn run<F: FnMut(u8)>(
        &self,
        clips: &[ClipSpec],
        output: &Path,
        temp: &mut TempFileManager,
        state: &mut ExportState,
        reporter: &mut ProgressReporter<F>,
    ) -> SpliceResult<()> {
        let job = self.prepare(clips, output).await?;
        let count = job.clips.len();
        tracing::info!(
            clips = count,
            target = %job.target,
            expected_duration_secs = job.expected_duration_secs,
            "Export job validated"
        );

        let mut phase = state.phase.next(count);
        loop {
            state.phase = phase;
            tracing::debug!(phase = %phase, "Entering export phase");
            let window = phase.window(count);
            reporter.enter(window);

            match phase {
                ExportPhase::Extracting(index) => {
                    let clip = &job.clips[index];
                    let dest = temp.allocate(SEGMENT_PREFIX);
                    let window = window.unwrap_or(EXTRACT_WINDOW);
                    self.extractor
                        .extract(clip, &dest, job.target, job.audio[index], |local| {
                            reporter.report(window.map_percent(local))
                        })
                        .await?;
                    state.segments.push(Segment {
                        source_clip: clip.clone(),
                        temp_path: dest,
                    });
                    reporter.report(window.map_percent(100));
                }
                ExportPhase::Concatenating => {
                    let paths: Vec<PathBuf> = state
                        .segments
                        .iter()
                        .map(|segment| segment.temp_path.clone())
                        .collect();
                    state.output_started = true;
                    self.concatenator
                        .concatenate(&paths, output, job.expected_duration_secs, |local| {
                            reporter.report(CONCAT_WINDOW.map_percent(local))
                        })
                        .await?;
                    let removed = temp.release(&paths);
                    tracing::debug!(removed, "Released concatenated segments");
                }
                ExportPhase::Finalizing => {
                    self.finalize(output, job.expected_duration_secs).await?;
                    reporter.report(100);
                }
                ExportPhase::Done => return Ok(()),
                other => {
                    return Err(SpliceError::unclassified(format!(
                        "export reached unexpected phase: {other}"
                    )))
                }
            }

            phase = phase.next(count);
        }
    }

    /// Validation phase: nothing is spawned until this succeeds.
    async fn prepare(&self, clips: &[ClipSpec], output: &Path) -> SpliceResult<PreparedJob> {
        let (clips, target) = validate_clips(clips)?;
        ensure_output_writable(output)?;

        for clip in &clips {
            if !clip.file_path.is_file() {
                return Err(SpliceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("source not found: {}", clip.file_path.display()),
                )));
            }
        }

        let audio = match &self.probe {
            Some(probe) => self.probe_sources(probe, &clips).await?,
            None => vec![AudioSource::Stream; clips.len()],
        };

        Ok(PreparedJob {
            expected_duration_secs: total_duration(&clips),
            clips,
            audio,
            target,
        })
    }

    async fn probe_sources(
        &self,
        probe: &Arc<dyn MediaProbe>,
        clips: &[ClipSpec],
    ) -> SpliceResult<Vec<AudioSource>> {
        let mut audio = Vec::with_capacity(clips.len());
        for clip in clips {
            let info = match self.lookup(probe.as_ref(), &clip.file_path).await {
                Ok(info) => info,
                Err(err @ SpliceError::Timeout { .. }) => return Err(err),
                Err(err) => {
                    return Err(SpliceError::invalid_input(format!(
                        "cannot read {}: {err}",
                        clip.file_path.display()
                    )))
                }
            };
            clip.validate_against(info.duration_secs)
                .map_err(|e| SpliceError::invalid_input(e.to_string()))?;
            if !info.has_audio {
                tracing::info!(clip = clip.order, "Clip has no audio, synthesizing silence");
            }
            audio.push(if info.has_audio {
                AudioSource::Stream
            } else {
                AudioSource::Silence
            });
        }
        Ok(audio)
    }

    async fn finalize(&self, output: &Path, expected_duration_secs: f64) -> SpliceResult<()> {
        let metadata = std::fs::metadata(output).map_err(|e| {
            SpliceError::output_missing(format!("{}: {e}", output.display()))
        })?;
        if metadata.len() == 0 {
            return Err(SpliceError::output_missing(format!(
                "{} is empty",
                output.display()
            )));
        }

        if let Some(probe) = &self.probe {
            match self.lookup(probe.as_ref(), output).await {
                Ok(info) => {
                    let drift = info.duration_secs - expected_duration_secs;
                    if drift.abs() > DURATION_DRIFT_WARN_SECS {
                        tracing::warn!(
                            actual_secs = info.duration_secs,
                            expected_secs = expected_duration_secs,
                            "Output duration differs from the timeline"
                        );
                    } else {
                        tracing::info!(
                            actual_secs = info.duration_secs,
                            expected_secs = expected_duration_secs,
                            "Output duration verified"
                        );
                    }
                }
                Err(err) => tracing::warn!(error = %err, "Could not probe export output"),
            }
        }
        Ok(())
    }

    /// Run one metadata lookup under the configured budget. Expiry drops
    /// the lookup, which kills any subprocess behind it.
    async fn lookup(&self, probe: &dyn MediaProbe, path: &Path) -> SpliceResult<MediaInfo> {
        let limit = self.settings.probe_timeout();
        match tokio::time::timeout(limit, probe.probe(path)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    timeout_secs = limit.as_secs_f64(),
                    "Media lookup exceeded its time budget"
                );
                Err(SpliceError::timeout(
                    format!("media lookup of {}", path.display()),
                    limit,
                ))
            }
        }
    }
}

/// Sort, validate and pick the target resolution.
fn validate_clips(clips: &[ClipSpec]) -> SpliceResult<(Vec<ClipSpec>, TargetResolution)> {
    if clips.is_empty() {
        return Err(SpliceError::invalid_input("timeline has no clips"));
    }
    let sorted = sort_by_order(clips);
    for clip in &sorted {
        clip.validate()
            .map_err(|e| SpliceError::invalid_input(e.to_string()))?;
    }
    let target = TargetResolution::from_clips(&sorted)
        .ok_or_else(|| SpliceError::invalid_input("timeline has no clips"))?;
    Ok((sorted, target))
}

/// Create the output directory if needed and prove it accepts new files.
fn ensure_output_writable(output: &Path) -> SpliceResult<()> {
    if output.is_dir() {
        return Err(SpliceError::invalid_input(format!(
            "output path {} is a directory",
            output.display()
        )));
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let denied = |e: std::io::Error| {
        SpliceError::permission_denied(format!("{} is not writable: {e}", dir.display()))
    };

    std::fs::create_dir_all(&dir).map_err(denied)?;
    let probe_file = dir.join(format!(
        ".splice-write-check-{}-{}",
        std::process::id(),
        unique_stamp()
    ));
    std::fs::write(&probe_file, b"").map_err(denied)?;
    if let Err(err) = std::fs::remove_file(&probe_file) {
        tracing::warn!(
            path = %probe_file.display(),
            error = %err,
            "Failed to remove write check file"
        );
    }
    Ok(())
}

fn remove_partial_output(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::info!(path = %output.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(
                path = %output.display(),
                error = %err,
                "Failed to remove partial output"
            )
        }
    }
}
