//! Timeline manifest files.
//!
//! A manifest is the on-disk JSON form of an export request: the clip list
//! plus an optional default output path. Relative paths inside a manifest
//! are resolved against the directory containing it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clip::{sort_by_order, ClipSpec};

/// Current manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0";

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineManifest {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Clips in any array order; `order` decides the sequence.
    pub clips: Vec<ClipSpec>,

    /// Default output file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

fn default_version() -> String {
    MANIFEST_VERSION.to_string()
}

impl TimelineManifest {
    pub fn new(clips: Vec<ClipSpec>) -> Self {
        Self {
            version: default_version(),
            clips,
            output: None,
        }
    }

    /// Load a manifest and resolve its relative paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut manifest: Self =
            serde_json::from_str(&content).map_err(|e| ManifestError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::ValidationError {
                message: format!(
                    "unsupported manifest version {} (expected {MANIFEST_VERSION})",
                    manifest.version
                ),
            });
        }

        let base = path.parent().unwrap_or(Path::new("."));
        for clip in &mut manifest.clips {
            if clip.file_path.is_relative() {
                clip.file_path = base.join(&clip.file_path);
            }
        }
        if let Some(output) = manifest.output.as_mut() {
            if output.is_relative() {
                *output = base.join(&*output);
            }
        }

        Ok(manifest)
    }

    /// Save the manifest as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ManifestError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Clips in concatenation order.
    pub fn sorted_clips(&self) -> Vec<ClipSpec> {
        sort_by_order(&self.clips)
    }

    /// Check clip invariants and that every source exists.
    /// Returns a human-readable problem list (empty when valid).
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];

        if self.clips.is_empty() {
            problems.push("Manifest contains no clips".to_string());
        }

        for clip in self.sorted_clips() {
            if let Err(err) = clip.validate() {
                problems.push(err.to_string());
            }
            if !clip.file_path.exists() {
                problems.push(format!(
                    "clip {} source missing: {}",
                    clip.order,
                    clip.file_path.display()
                ));
            }
        }

        problems
    }
}

/// Errors that can occur when reading or writing manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid manifest: {message}")]
    ValidationError { message: String },
}
