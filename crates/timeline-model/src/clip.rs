//! Clip specifications supplied by the presentation layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Slack allowed when comparing `trim_end` against a probed duration.
/// Container durations are frequently rounded to the nearest packet.
pub const DURATION_TOLERANCE_SECS: f64 = 0.05;

/// One trimmed clip on the timeline.
///
/// Immutable for the duration of an export. Field names serialize in
/// camelCase to match what the editor front end sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSpec {
    /// Source media file.
    pub file_path: PathBuf,

    /// Display name of the source.
    #[serde(default)]
    pub file_name: String,

    /// In point, seconds into the source.
    pub trim_start: f64,

    /// Out point, seconds into the source.
    pub trim_end: f64,

    /// Source frame size (pixels).
    pub width: u32,
    pub height: u32,

    /// Position on the timeline; concatenation follows this, not array order.
    pub order: u32,
}

/// Reasons a clip cannot be exported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClipError {
    #[error("clip {order} ({name}): trim points must be finite")]
    NonFiniteTrim { order: u32, name: String },

    #[error("clip {order} ({name}): trim start {start:.3}s is negative")]
    NegativeStart { order: u32, name: String, start: f64 },

    #[error("clip {order} ({name}): trim end {end:.3}s must be after trim start {start:.3}s")]
    EmptyRange {
        order: u32,
        name: String,
        start: f64,
        end: f64,
    },

    #[error("clip {order} ({name}): frame size {width}x{height} must be non-zero")]
    ZeroDimensions {
        order: u32,
        name: String,
        width: u32,
        height: u32,
    },

    #[error("clip {order} ({name}): trim end {end:.3}s exceeds source duration {duration:.3}s")]
    BeyondSource {
        order: u32,
        name: String,
        end: f64,
        duration: f64,
    },
}

impl ClipSpec {
    /// Create a clip, deriving `file_name` from the path.
    pub fn new(
        file_path: impl Into<PathBuf>,
        trim_start: f64,
        trim_end: f64,
        width: u32,
        height: u32,
        order: u32,
    ) -> Self {
        let file_path = file_path.into();
        let file_name = display_name(&file_path);
        Self {
            file_path,
            file_name,
            trim_start,
            trim_end,
            width,
            height,
            order,
        }
    }

    /// Length of the trimmed range in seconds.
    pub fn trim_duration(&self) -> f64 {
        (self.trim_end - self.trim_start).max(0.0)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Name used in messages; falls back to the path when `file_name` is empty.
    pub fn label(&self) -> String {
        if self.file_name.is_empty() {
            display_name(&self.file_path)
        } else {
            self.file_name.clone()
        }
    }

    /// Check the invariants that do not need the source file.
    pub fn validate(&self) -> Result<(), ClipError> {
        let name = self.label();
        let order = self.order;

        if !self.trim_start.is_finite() || !self.trim_end.is_finite() {
            return Err(ClipError::NonFiniteTrim { order, name });
        }
        if self.trim_start < 0.0 {
            return Err(ClipError::NegativeStart {
                order,
                name,
                start: self.trim_start,
            });
        }
        if self.trim_end <= self.trim_start {
            return Err(ClipError::EmptyRange {
                order,
                name,
                start: self.trim_start,
                end: self.trim_end,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ClipError::ZeroDimensions {
                order,
                name,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Full invariant check once the source duration is known.
    pub fn validate_against(&self, source_duration: f64) -> Result<(), ClipError> {
        self.validate()?;
        if self.trim_end > source_duration + DURATION_TOLERANCE_SECS {
            return Err(ClipError::BeyondSource {
                order: self.order,
                name: self.label(),
                end: self.trim_end,
                duration: source_duration,
            });
        }
        Ok(())
    }
}

/// Return the clips sorted by `order`. The sort is stable, so clips sharing
/// an `order` keep their relative input position.
pub fn sort_by_order(clips: &[ClipSpec]) -> Vec<ClipSpec> {
    let mut sorted = clips.to_vec();
    sorted.sort_by_key(|clip| clip.order);
    sorted
}

/// Sum of all trimmed durations.
pub fn total_duration(clips: &[ClipSpec]) -> f64 {
    clips.iter().map(ClipSpec::trim_duration).sum()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clip(order: u32) -> ClipSpec {
        ClipSpec::new(format!("/media/clip{order}.mp4"), 1.0, 4.0, 1280, 720, order)
    }

    #[test]
    fn test_new_derives_file_name() {
        let c = clip(3);
        assert_eq!(c.file_name, "clip3.mp4");
        assert!((c.trim_duration() - 3.0).abs() < 1e-9);
        assert_eq!(c.pixel_count(), 921_600);
    }

    #[test]
    fn test_validate_accepts_well_formed_clip() {
        assert!(clip(0).validate().is_ok());
        assert!(clip(0).validate_against(4.0).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let mut c = clip(1);
        c.trim_end = c.trim_start;
        assert!(matches!(c.validate(), Err(ClipError::EmptyRange { .. })));
    }

    #[test]
    fn test_validate_rejects_negative_start_and_zero_size() {
        let mut c = clip(1);
        c.trim_start = -0.5;
        assert!(matches!(c.validate(), Err(ClipError::NegativeStart { .. })));

        let mut c = clip(1);
        c.height = 0;
        assert!(matches!(c.validate(), Err(ClipError::ZeroDimensions { .. })));

        let mut c = clip(1);
        c.trim_end = f64::INFINITY;
        assert!(matches!(c.validate(), Err(ClipError::NonFiniteTrim { .. })));
    }

    #[test]
    fn test_validate_against_source_duration() {
        let c = clip(2);
        let err = c.validate_against(3.5).unwrap_err();
        assert!(err.to_string().contains("exceeds source duration"));
        // rounding slack
        assert!(c.validate_against(3.97).is_ok());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "filePath": "/media/a.mov",
            "fileName": "a.mov",
            "trimStart": 0.5,
            "trimEnd": 2.0,
            "width": 1920,
            "height": 1080,
            "order": 1
        }"#;
        let c: ClipSpec = serde_json::from_str(json).unwrap();
        assert_eq!(c.file_path, PathBuf::from("/media/a.mov"));
        assert_eq!(c.order, 1);
        assert!((c.trim_start - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sort_is_stable_for_equal_order() {
        let mut a = clip(1);
        a.file_name = "first".to_string();
        let mut b = clip(1);
        b.file_name = "second".to_string();
        let sorted = sort_by_order(&[clip(2), a, b, clip(0)]);
        let names: Vec<_> = sorted.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["clip0.mp4", "first", "second", "clip2.mp4"]);
    }

    proptest! {
        #[test]
        fn prop_sorted_sequence_ignores_input_permutation(
            orders in proptest::collection::hash_set(0u32..1000, 1..12),
            seed in any::<u64>(),
        ) {
            let clips: Vec<ClipSpec> = orders.iter().map(|&o| clip(o)).collect();

            let mut shuffled = clips.clone();
            // deterministic Fisher-Yates driven by the seed
            let mut state = seed;
            for i in (1..shuffled.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }

            let expected: Vec<u32> = sort_by_order(&clips).iter().map(|c| c.order).collect();
            let actual: Vec<u32> = sort_by_order(&shuffled).iter().map(|c| c.order).collect();
            prop_assert_eq!(&actual, &expected);
            prop_assert!(actual.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
