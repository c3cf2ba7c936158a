//! Splice Common Utilities
//!
//! Shared infrastructure for all Splice crates:
//! - Error taxonomy and result aliases
//! - Clock and timestamp utilities
//! - Tracing/logging initialization
//! - Configuration loading and tool resolution

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
