//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VidlayerError, VidlayerResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where rendered outputs are written, one file per job.
    pub output_dir: PathBuf,

    /// External media engine settings.
    pub engine: EngineConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Settings for the external media engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable, resolved through `PATH` when not absolute.
    pub binary: PathBuf,

    /// Upper bound on a single render's wall-clock time. `None` disables it.
    pub timeout_secs: Option<u64>,

    /// Video codec passed to the engine.
    pub video_codec: String,

    /// Output pixel format.
    pub pixel_format: String,

    /// Encoder speed preset.
    pub preset: String,

    /// Output container extension (e.g. "mp4").
    pub container: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vidlayer_jobs=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_outputs(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            timeout_secs: Some(600),
            video_codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            preset: "ultrafast".to_string(),
            container: "mp4".to_string(),
        }
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

impl EngineConfig {
    /// Configured render timeout, if any.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
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

    /// Load config from an explicit path. Missing keys take their defaults.
    pub fn load_from(path: &Path) -> VidlayerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VidlayerError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                VidlayerError::Io(e)
            }
        })?;
        serde_json::from_str(&content)
            .map_err(|e| VidlayerError::config(format!("{}: {e}", path.display())))
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vidlayer").join("config.json")
}

/// Default output directory.
fn dirs_default_outputs() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("vidlayer").join("outputs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults_favor_compatibility_and_speed() {
        let engine = EngineConfig::default();
        assert_eq!(engine.video_codec, "libx264");
        assert_eq!(engine.pixel_format, "yuv420p");
        assert_eq!(engine.preset, "ultrafast");
        assert_eq!(engine.timeout(), Some(std::time::Duration::from_secs(600)));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"preset": "veryfast"}}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.preset, "veryfast");
        assert_eq!(config.engine.video_codec, "libx264");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.engine.timeout_secs = None;
        config.output_dir = dir.path().join("out");
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.engine.timeout_secs, None);
        assert_eq!(loaded.output_dir, dir.path().join("out"));
    }

    #[test]
    fn test_missing_config_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, VidlayerError::FileNotFound { .. }));
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, VidlayerError::Config { .. }));
    }
}
