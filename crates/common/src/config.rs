//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SpliceError, SpliceResult};

/// Environment variable overriding the transcoder binary.
pub const FFMPEG_ENV: &str = "SPLICE_FFMPEG";

/// Environment variable overriding the probe binary.
pub const FFPROBE_ENV: &str = "SPLICE_FFPROBE";

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External tool locations.
    #[serde(default)]
    pub tools: ToolPaths,

    /// Export pipeline settings.
    #[serde(default)]
    pub export: ExportSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Explicit locations of the external media tools.
///
/// `None` means "look it up once at startup" (env override, then `PATH`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Parameters of the export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Budget for a single segment extraction.
    pub segment_timeout_secs: u64,

    /// Budget for the concatenation pass.
    pub concat_timeout_secs: u64,

    /// Budget for one metadata lookup (source or output).
    pub probe_timeout_secs: u64,

    /// Constant output frame rate for segments and final output.
    pub frame_rate: u32,

    /// x264 constant rate factor.
    pub crf: u32,

    /// x264 preset.
    pub preset: String,

    pub audio_sample_rate: u32,
    pub audio_channels: u32,

    /// Bitrate of the compressed audio in the final output.
    pub audio_bitrate_kbps: u32,

    /// Minimum local progress increase before a new report is emitted.
    pub progress_step: u8,

    /// Directory for intermediate segments (OS temp dir when unset).
    pub temp_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "splice=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            segment_timeout_secs: 60,
            concat_timeout_secs: 300,
            probe_timeout_secs: 30,
            frame_rate: 30,
            crf: 23,
            preset: "fast".to_string(),
            audio_sample_rate: 48000,
            audio_channels: 2,
            audio_bitrate_kbps: 192,
            progress_step: 2,
            temp_dir: None,
        }
    }
}

impl ExportSettings {
    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }

    pub fn concat_timeout(&self) -> Duration {
        Duration::from_secs(self.concat_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Directory intermediate files are allocated in.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit file.
    pub fn load_from(path: &Path) -> SpliceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolve the transcoder binary. Call once at startup.
    pub fn resolve_ffmpeg(&self) -> SpliceResult<PathBuf> {
        resolve_binary(self.tools.ffmpeg.as_deref(), FFMPEG_ENV, "ffmpeg")
    }

    /// Resolve the probe binary. Call once at startup.
    pub fn resolve_ffprobe(&self) -> SpliceResult<PathBuf> {
        resolve_binary(self.tools.ffprobe.as_deref(), FFPROBE_ENV, "ffprobe")
    }
}

/// Find an executable: explicit path, then `env_var`, then `PATH`.
pub fn resolve_binary(
    configured: Option<&Path>,
    env_var: &str,
    name: &str,
) -> SpliceResult<PathBuf> {
    if let Some(path) = configured {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(SpliceError::config(format!(
                "Configured {name} not found at {}",
                path.display()
            )))
        };
    }

    if let Some(path) = std::env::var_os(env_var).map(PathBuf::from) {
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(
            var = env_var,
            path = %path.display(),
            "Ignoring override, file does not exist"
        );
    }

    find_in_path(name).ok_or_else(|| {
        SpliceError::config(format!(
            "{name} not found in PATH (set {env_var} or configure tools.{name})"
        ))
    })
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("splice").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_defaults() {
        let settings = ExportSettings::default();
        assert_eq!(settings.segment_timeout(), Duration::from_secs(60));
        assert_eq!(settings.concat_timeout(), Duration::from_secs(300));
        assert_eq!(settings.probe_timeout(), Duration::from_secs(30));
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.progress_step, 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"export": {"segment_timeout_secs": 90}}"#).unwrap();
        assert_eq!(config.export.segment_timeout_secs, 90);
        assert_eq!(config.export.concat_timeout_secs, 300);
        assert_eq!(config.export.preset, "fast");
        assert!(config.tools.ffmpeg.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_resolve_binary_rejects_missing_configured_path() {
        let err = resolve_binary(
            Some(Path::new("/definitely/not/here/ffmpeg")),
            "SPLICE_TEST_UNUSED",
            "ffmpeg",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Configured ffmpeg not found"));
    }

    #[test]
    fn test_resolve_binary_accepts_existing_configured_path() {
        let dir = std::env::temp_dir().join("splice_test_resolve_binary");
        std::fs::create_dir_all(&dir).unwrap();
        let fake = dir.join("ffmpeg");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let resolved = resolve_binary(Some(&fake), "SPLICE_TEST_UNUSED", "ffmpeg").unwrap();
        assert_eq!(resolved, fake);

        std::fs::remove_dir_all(&dir).ok();
    }
}
