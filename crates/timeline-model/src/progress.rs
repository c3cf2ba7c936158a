//! Progress windows and filters.
//!
//! An export reports one global percentage. Each phase owns a fixed
//! [`ProgressWindow`] of that scale and reports local 0–100 progress which
//! is mapped into its window. Two filter stages sit between the raw signal
//! and the caller: [`ProgressThrottle`] drops insignificant local changes,
//! [`MonotonicProgress`] guarantees the global sequence never goes backwards.

use serde::{Deserialize, Serialize};

/// Global window owned by segment extraction (split evenly across clips).
pub const EXTRACT_WINDOW: ProgressWindow = ProgressWindow::new(5.0, 55.0);

/// Global window owned by concatenation.
pub const CONCAT_WINDOW: ProgressWindow = ProgressWindow::new(55.0, 90.0);

/// Global window owned by finalization.
pub const FINALIZE_WINDOW: ProgressWindow = ProgressWindow::new(90.0, 100.0);

/// Default minimum step between two local progress reports.
pub const DEFAULT_PROGRESS_STEP: u8 = 2;

/// A `[start, end]` sub-range of the global 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressWindow {
    pub start_percent: f64,
    pub end_percent: f64,
}

impl ProgressWindow {
    pub const fn new(start_percent: f64, end_percent: f64) -> Self {
        Self {
            start_percent,
            end_percent,
        }
    }

    pub fn span(&self) -> f64 {
        self.end_percent - self.start_percent
    }

    /// Map a local percentage (clamped to 0–100) into this window.
    pub fn map(&self, local: f64) -> f64 {
        let local = if local.is_finite() {
            local.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.start_percent + self.span() * local / 100.0
    }

    /// Like [`map`](Self::map), truncated to a whole percentage.
    pub fn map_percent(&self, local: u8) -> u8 {
        self.map(local as f64).floor().clamp(0.0, 100.0) as u8
    }

    /// The `index`-th of `count` equal slices of this window.
    pub fn slice(&self, index: usize, count: usize) -> Self {
        if count == 0 {
            return *self;
        }
        let index = index.min(count - 1) as f64;
        let width = self.span() / count as f64;
        Self::new(
            self.start_percent + width * index,
            self.start_percent + width * (index + 1.0),
        )
    }
}

/// Passes a local percentage only when it moved by at least `step`.
///
/// Reaching 100 always passes once. Output is non-decreasing.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: u8,
    last: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            last: None,
        }
    }

    /// Offer a new reading; returns the value to emit, if any.
    pub fn accept(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        let emit = match self.last {
            None => true,
            Some(last) if percent == 100 && last < 100 => true,
            Some(last) => percent >= last.saturating_add(self.step),
        };
        if emit {
            self.last = Some(percent);
            Some(percent)
        } else {
            None
        }
    }

    /// Emit regardless of the step, as long as it does not go backwards.
    /// Used for phase boundary reports (0 at start, 100 at end).
    pub fn force(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        if percent >= self.last.unwrap_or(0) {
            self.last = Some(percent);
            Some(percent)
        } else {
            None
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_STEP)
    }
}

/// Guarantees the global progress sequence is non-decreasing and free of
/// duplicates.
#[derive(Debug, Clone, Default)]
pub struct MonotonicProgress {
    last: Option<u8>,
}

impl MonotonicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(percent)` when it is strictly greater than everything
    /// emitted so far (or is the first value).
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}
