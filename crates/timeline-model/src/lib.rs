//! Splice Timeline Model
//!
//! Defines the data contracts of a timeline export:
//! - **Clips:** Trimmed source media with a concatenation `order`
//! - **Resolution:** The common frame size every segment is normalized to
//! - **Progress:** Windows and filters that fold per-phase progress into one
//!   monotonic 0–100 scale
//! - **Manifest:** The on-disk JSON form of a timeline
//!
//! Clip ordering is always by the `order` field, never by array position.

pub mod clip;
pub mod manifest;
pub mod progress;
pub mod resolution;

pub use clip::*;
pub use manifest::*;
pub use progress::*;
pub use resolution::*;
