//! Splice Export Engine
//!
//! Turns an ordered list of trimmed clips into one video file by driving an
//! external transcoder.
//!
//! # Pipeline Architecture
//!
//! ```text
//! clip 0 ──▶ extract ──▶ segment-0.mkv ──┐
//! clip 1 ──▶ extract ──▶ segment-1.mkv ──┤
//!   …                                    ├── concat filter graph ──▶ output.mp4
//! clip n ──▶ extract ──▶ segment-n.mkv ──┘
//!
//! every arrow: one ProcessInvoker subprocess, one timeout
//! ```
//!
//! Segments are normalized to a common frame size, 30 fps and PCM audio so
//! the final pass can join them without drift.

pub mod concat;
pub mod diagnostics;
pub mod exporter;
pub mod extract;
pub mod invoker;
pub mod probe;
pub mod temp;

pub use concat::SegmentConcatenator;
pub use diagnostics::ProgressSnapshot;
pub use exporter::{ExportPhase, Segment, TimelineExporter};
pub use extract::{AudioSource, SegmentExtractor};
pub use invoker::{
    CancelHandle, InvocationHandle, InvokerEvent, ProcessExit, ProcessInvoker, TranscodeRequest,
    Transcoder,
};
pub use probe::{FfprobeProbe, MediaInfo, MediaProbe};
pub use temp::TempFileManager;
