//! Target frame size for a timeline export.

use serde::{Deserialize, Serialize};

use crate::clip::ClipSpec;

/// The common frame size every segment is scaled and padded to.
///
/// Both dimensions are always even; H.264 with 4:2:0 chroma rejects odd sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetResolution {
    pub width: u32,
    pub height: u32,
}

impl TargetResolution {
    /// Create a resolution, rounding each dimension down to an even value
    /// (minimum 2).
    pub fn even(width: u32, height: u32) -> Self {
        Self {
            width: round_even(width),
            height: round_even(height),
        }
    }

    /// The frame size of the clip with the largest pixel count.
    ///
    /// On ties the earliest clip wins, so callers should pass clips already
    /// sorted by `order`. Returns `None` for an empty slice.
    pub fn from_clips(clips: &[ClipSpec]) -> Option<Self> {
        let mut best: Option<&ClipSpec> = None;
        for clip in clips {
            match best {
                Some(current) if clip.pixel_count() <= current.pixel_count() => {}
                _ => best = Some(clip),
            }
        }
        best.map(|clip| Self::even(clip.width, clip.height))
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for TargetResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn round_even(value: u32) -> u32 {
    (value & !1).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(width: u32, height: u32, order: u32) -> ClipSpec {
        ClipSpec::new("/media/x.mp4", 0.0, 1.0, width, height, order)
    }

    #[test]
    fn test_picks_largest_pixel_count() {
        let clips = [clip(1280, 720, 0), clip(1920, 1080, 1), clip(640, 480, 2)];
        let target = TargetResolution::from_clips(&clips).unwrap();
        assert_eq!(target, TargetResolution { width: 1920, height: 1080 });
        assert_eq!(target.to_string(), "1920x1080");
    }

    #[test]
    fn test_tie_prefers_first_clip() {
        // 1080x1920 and 1920x1080 have the same pixel count
        let clips = [clip(1080, 1920, 0), clip(1920, 1080, 1)];
        let target = TargetResolution::from_clips(&clips).unwrap();
        assert_eq!(target.width, 1080);
        assert_eq!(target.height, 1920);
    }

    #[test]
    fn test_odd_dimensions_round_down_to_even() {
        let target = TargetResolution::from_clips(&[clip(1281, 721, 0)]).unwrap();
        assert_eq!(target, TargetResolution { width: 1280, height: 720 });
        assert_eq!(TargetResolution::even(1, 1), TargetResolution { width: 2, height: 2 });
    }

    #[test]
    fn test_empty_has_no_target() {
        assert!(TargetResolution::from_clips(&[]).is_none());
    }
}
