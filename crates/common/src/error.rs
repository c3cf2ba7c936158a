//! Error taxonomy shared across Splice crates.
//!
//! Every failure that leaves the export boundary is a [`SpliceError`] whose
//! [`ErrorKind`] is one of a small, fixed set the presentation layer can
//! switch on. Raw process exit codes never cross that boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Diagnostic text the transcoder prints when the target device is full.
pub const DISK_FULL_SIGNATURE: &str = "No space left on device";

/// Diagnostic text the transcoder prints when a path does not exist.
pub const NOT_FOUND_SIGNATURE: &str = "No such file or directory";

#[cfg(unix)]
const ENOSPC: i32 = libc::ENOSPC;
#[cfg(not(unix))]
const ENOSPC: i32 = 112;

#[cfg(unix)]
const ENOENT: i32 = libc::ENOENT;
#[cfg(not(unix))]
const ENOENT: i32 = 2;

/// Machine-readable classification of a failed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    PermissionDenied,
    Timeout,
    TranscodeError,
    DiskFull,
    OutputMissing,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::PermissionDenied => "permission_denied",
            Self::Timeout => "timeout",
            Self::TranscodeError => "transcode_error",
            Self::DiskFull => "disk_full",
            Self::OutputMissing => "output_missing",
            Self::Unclassified => "unclassified",
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "The export request is invalid. Check the clips and output path.",
            Self::PermissionDenied => {
                "The output folder is not writable. Choose another location."
            }
            Self::Timeout => "Export took too long and was stopped.",
            Self::TranscodeError => "The video encoder failed while processing a clip.",
            Self::DiskFull => "Not enough disk space to finish the export.",
            Self::OutputMissing => "A required file could not be found during export.",
            Self::Unclassified => "Export failed.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for Splice operations.
#[derive(Debug, thiserror::Error)]
pub enum SpliceError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("{phase} timed out after {}s", .limit.as_secs())]
    Timeout { phase: String, limit: Duration },

    #[error("Transcode error: {message}")]
    Transcode { message: String, diagnostics: String },

    #[error("Disk full: {message}")]
    DiskFull { message: String, diagnostics: String },

    #[error("Output missing: {message}")]
    OutputMissing { message: String, diagnostics: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Export failed: {message}")]
    Unclassified { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SpliceError.
pub type SpliceResult<T> = Result<T, SpliceError>;

impl SpliceError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn timeout(phase: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            phase: phase.into(),
            limit,
        }
    }

    pub fn transcode(msg: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::Transcode {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn disk_full(msg: impl Into<String>) -> Self {
        Self::DiskFull {
            message: msg.into(),
            diagnostics: String::new(),
        }
    }

    pub fn output_missing(msg: impl Into<String>) -> Self {
        Self::OutputMissing {
            message: msg.into(),
            diagnostics: String::new(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unclassified(msg: impl Into<String>) -> Self {
        Self::Unclassified {
            message: msg.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transcode { .. } => ErrorKind::TranscodeError,
            Self::DiskFull { .. } => ErrorKind::DiskFull,
            Self::OutputMissing { .. } => ErrorKind::OutputMissing,
            Self::Io(err) => io_error_kind(err).unwrap_or(ErrorKind::Unclassified),
            Self::Probe { .. }
            | Self::Config { .. }
            | Self::Unclassified { .. }
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::Unclassified,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    /// Diagnostic tail captured from the transcoder, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Transcode { diagnostics, .. }
            | Self::DiskFull { diagnostics, .. }
            | Self::OutputMissing { diagnostics, .. }
                if !diagnostics.is_empty() =>
            {
                Some(diagnostics)
            }
            _ => None,
        }
    }

    /// Rewrite this error into its final taxonomy variant.
    ///
    /// Transcoder failures whose diagnostics carry a recognized system error
    /// become `DiskFull` / `OutputMissing`; I/O errors are mapped by OS code;
    /// everything outside the taxonomy collapses into `Unclassified`.
    pub fn classify(self) -> Self {
        match self {
            Self::Transcode {
                message,
                diagnostics,
            } => {
                if let Some(line) = signature_line(&diagnostics, DISK_FULL_SIGNATURE) {
                    Self::DiskFull {
                        message: line,
                        diagnostics,
                    }
                } else if let Some(line) = signature_line(&diagnostics, NOT_FOUND_SIGNATURE) {
                    Self::OutputMissing {
                        message: line,
                        diagnostics,
                    }
                } else {
                    Self::Transcode {
                        message,
                        diagnostics,
                    }
                }
            }
            Self::Io(err) => match io_error_kind(&err) {
                Some(ErrorKind::DiskFull) => Self::disk_full(err.to_string()),
                Some(ErrorKind::OutputMissing) => Self::output_missing(err.to_string()),
                Some(ErrorKind::PermissionDenied) => Self::permission_denied(err.to_string()),
                _ => Self::unclassified(err.to_string()),
            },
            Self::Probe { message } | Self::Config { message } => Self::unclassified(message),
            Self::Json(err) => Self::unclassified(err.to_string()),
            Self::Other(err) => Self::unclassified(format!("{err:#}")),
            other => other,
        }
    }
}

fn io_error_kind(err: &std::io::Error) -> Option<ErrorKind> {
    match err.raw_os_error() {
        Some(code) if code == ENOSPC => return Some(ErrorKind::DiskFull),
        Some(code) if code == ENOENT => return Some(ErrorKind::OutputMissing),
        _ => {}
    }
    match err.kind() {
        std::io::ErrorKind::NotFound => Some(ErrorKind::OutputMissing),
        std::io::ErrorKind::PermissionDenied => Some(ErrorKind::PermissionDenied),
        _ => None,
    }
}

fn signature_line(diagnostics: &str, signature: &str) -> Option<String> {
    diagnostics
        .lines()
        .rev()
        .find(|line| line.contains(signature))
        .map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping_for_direct_variants() {
        assert_eq!(
            SpliceError::invalid_input("no clips").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            SpliceError::timeout("segment 1", Duration::from_secs(60)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            SpliceError::transcode("exit 1", "").kind(),
            ErrorKind::TranscodeError
        );
        assert_eq!(SpliceError::config("bad").kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn test_timeout_display_mentions_phase_and_limit() {
        let err = SpliceError::timeout("concatenation", Duration::from_secs(300));
        assert_eq!(err.to_string(), "concatenation timed out after 300s");
    }

    #[test]
    fn test_classify_disk_full_from_diagnostics() {
        let err = SpliceError::transcode(
            "ffmpeg exited with status 1",
            "frame=  10 fps=0.0\nav_interleaved_write_frame(): No space left on device\n",
        )
        .classify();
        assert_eq!(err.kind(), ErrorKind::DiskFull);
        assert!(err.to_string().contains("No space left on device"));
        let tail = err.diagnostics().unwrap();
        assert!(tail.contains("frame=  10"));
        assert!(tail.contains("av_interleaved_write_frame()"));
    }

    #[test]
    fn test_classify_missing_file_from_diagnostics() {
        let err = SpliceError::transcode(
            "ffmpeg exited with status 1",
            "/tmp/in.mp4: No such file or directory",
        )
        .classify();
        assert_eq!(err.kind(), ErrorKind::OutputMissing);
        assert_eq!(err.diagnostics(), Some("/tmp/in.mp4: No such file or directory"));
    }

    #[test]
    fn test_invalid_input_message_covers_output_problems() {
        let err = SpliceError::invalid_input("output path /tmp is a directory");
        assert!(!err.user_message().contains("clips on the timeline"));
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_io_classified_errors_have_no_diagnostics() {
        let full = SpliceError::Io(std::io::Error::from_raw_os_error(ENOSPC)).classify();
        assert_eq!(full.diagnostics(), None);
    }

    #[test]
    fn test_classify_keeps_plain_transcode_failure() {
        let err = SpliceError::transcode("exit 234", "Invalid data found").classify();
        assert_eq!(err.kind(), ErrorKind::TranscodeError);
        assert_eq!(err.diagnostics(), Some("Invalid data found"));
    }

    #[test]
    fn test_classify_io_errors_by_os_code() {
        let full = SpliceError::Io(std::io::Error::from_raw_os_error(ENOSPC)).classify();
        assert_eq!(full.kind(), ErrorKind::DiskFull);

        let missing = SpliceError::Io(std::io::Error::from_raw_os_error(ENOENT)).classify();
        assert_eq!(missing.kind(), ErrorKind::OutputMissing);

        let other = SpliceError::Io(std::io::Error::other("boom")).classify();
        assert_eq!(other.kind(), ErrorKind::Unclassified);
        assert_eq!(other.user_message(), "Export failed.");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DiskFull).unwrap();
        assert_eq!(json, "\"disk_full\"");
    }
}
