//! Parsing of the transcoder's diagnostic stream.
//!
//! ffmpeg writes its periodic statistics to stderr as a single line that is
//! rewritten in place with `\r`, e.g.
//!
//! ```text
//! frame=  100 fps= 25 q=28.0 size=     256kB time=00:00:04.00 bitrate= 524.3kbits/s speed=1.2x
//! ```
//!
//! The last report uses `Lsize=` instead of `size=`. With `-progress` the
//! same information arrives one `key=value` per line (`out_time_us=…`).
//! Both shapes are handled here.

use std::collections::VecDeque;

use serde::Serialize;
use splice_common::clock::parse_timestamp;

/// Lines retained for error reports.
pub const DEFAULT_TAIL_LINES: usize = 40;

/// Substrings that mark a diagnostic line as a failure report.
pub const FAILURE_SIGNATURES: &[&str] = &[
    "Error",
    "Invalid",
    "No such file or directory",
    "Permission denied",
    "No space left on device",
    "Conversion failed",
    "Unrecognized option",
    "Unknown encoder",
];

/// One parsed progress report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate: Option<String>,
    pub size: Option<String>,
    /// Output position in seconds.
    pub time_secs: Option<f64>,
    pub speed: Option<String>,
    /// `time_secs / expected duration`, clamped to 0–100.
    pub percent: Option<f64>,
    /// Set on the closing report (`Lsize=` or `progress=end`).
    pub is_final: bool,
}

impl ProgressSnapshot {
    /// Whole-number percentage, if one could be computed.
    pub fn percent_u8(&self) -> Option<u8> {
        self.percent.map(|p| p.floor().clamp(0.0, 100.0) as u8)
    }
}

/// Classification of one diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticLine {
    Progress(ProgressSnapshot),
    Failure(String),
    Info(String),
}

/// Classify a single line, computing a percentage against
/// `expected_duration_secs` when it is positive.
pub fn parse_diagnostic_line(line: &str, expected_duration_secs: f64) -> DiagnosticLine {
    let trimmed = line.trim();
    if let Some(snapshot) = parse_stats_line(trimmed, expected_duration_secs) {
        return DiagnosticLine::Progress(snapshot);
    }
    if FAILURE_SIGNATURES.iter().any(|sig| trimmed.contains(sig)) {
        return DiagnosticLine::Failure(trimmed.to_string());
    }
    DiagnosticLine::Info(trimmed.to_string())
}

/// Parse a statistics line. Returns `None` when the line carries no
/// progress keys.
pub fn parse_stats_line(line: &str, expected_duration_secs: f64) -> Option<ProgressSnapshot> {
    let mut snapshot = ProgressSnapshot::default();
    let mut recognized = false;

    for (key, value) in key_values(line) {
        match key.as_str() {
            "frame" => {
                snapshot.frame = value.parse().ok();
                recognized |= snapshot.frame.is_some();
            }
            "fps" => snapshot.fps = value.parse().ok(),
            "bitrate" => snapshot.bitrate = Some(value),
            "size" | "total_size" => {
                snapshot.size = Some(value);
                recognized = true;
            }
            "Lsize" => {
                snapshot.size = Some(value);
                snapshot.is_final = true;
                recognized = true;
            }
            "time" | "out_time" => {
                if let Some(secs) = parse_timestamp(&value) {
                    snapshot.time_secs = Some(secs.max(0.0));
                    recognized = true;
                }
            }
            // `out_time_ms` is microseconds as well; ffmpeg never fixed the name
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    snapshot.time_secs = Some((us / 1_000_000.0).max(0.0));
                    recognized = true;
                }
            }
            "speed" => snapshot.speed = Some(value),
            "progress" => {
                snapshot.is_final = value == "end";
                recognized = true;
            }
            _ => {}
        }
    }

    if !recognized {
        return None;
    }

    if expected_duration_secs > 0.0 {
        if let Some(time) = snapshot.time_secs {
            snapshot.percent = Some((time / expected_duration_secs * 100.0).clamp(0.0, 100.0));
        }
    }
    if snapshot.is_final && expected_duration_secs > 0.0 {
        snapshot.percent = Some(100.0);
    }

    Some(snapshot)
}

/// Split `key= value key2=value2` into pairs, tolerating the padding ffmpeg
/// inserts after `=`.
fn key_values(line: &str) -> Vec<(String, String)> {
    let mut normalized = String::with_capacity(line.len());
    let mut after_eq = false;
    for ch in line.chars() {
        if after_eq && ch == ' ' {
            continue;
        }
        after_eq = ch == '=';
        normalized.push(ch);
    }

    normalized
        .split_whitespace()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Splits a byte stream into lines on both `\r` and `\n`.
#[derive(Debug, Default)]
pub struct DiagnosticSplitter {
    pending: Vec<u8>,
}

impl DiagnosticSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every complete, non-empty line it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = vec![];
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left after the stream closed.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

/// Bounded ring of the most recent non-progress diagnostic lines.
#[derive(Debug)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}
