use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VidshrinkError};
use crate::media::Resolution;
use crate::output::OutputOptions;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vidshrink.toml";

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_allow_qsv() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path or name of the ffmpeg binary
    pub binary_path: String,
    /// Upper bound for each hardware probe subprocess
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Console log level when --debug is not given
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Encode with a 10-bit pixel format. Better compression, less device support.
    pub ten_bit: bool,
    /// AAC bitrate, e.g. "96k". Use 128k or more for music.
    pub audio_bitrate: String,
    /// Constant quality for hardware encoders (0-51, lower is better and bigger)
    pub quality: i32,
    /// Bounding box the output is downscaled into, "WIDTHxHEIGHT"
    pub target_resolution: Resolution,
    /// Probe for a hardware encoder before falling back to libx265
    pub prefer_hardware: bool,
    /// Allow Intel Quick Sync when an Intel GPU is detected
    #[serde(default = "default_allow_qsv")]
    pub allow_qsv: bool,
    /// Pass -y (true) or -n (false) to ffmpeg
    pub overwrite_existing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Mirror the input tree under this folder
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// Appended to the file stem of each output
    pub suffix: String,
    /// Write next to the input instead of under ./converted
    pub same_dir: bool,
    /// Skip inputs whose stem already ends with this
    #[serde(default)]
    pub ignore_suffix: Option<String>,
    /// Remove the input after a successful conversion
    pub delete_original: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_timeout_secs: default_probe_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            ten_bit: true,
            audio_bitrate: "96k".to_string(),
            // 1920x1080 takes about twice as long for a near-identical size
            quality: 28,
            target_resolution: Resolution {
                width: 1280,
                height: 720,
            },
            prefer_hardware: true,
            allow_qsv: true,
            overwrite_existing: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            suffix: "_converted".to_string(),
            same_dir: false,
            ignore_suffix: None,
            delete_original: false,
        }
    }
}

impl OutputConfig {
    pub fn options(&self) -> OutputOptions {
        OutputOptions {
            output_root: self.output_root.clone(),
            suffix: self.suffix.clone(),
            same_dir: self.same_dir,
            ignore_suffix: self.ignore_suffix.clone(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidshrinkError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VidshrinkError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidshrinkError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidshrinkError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Explicit path first, then `vidshrink.toml` in the working directory, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Reject values that would only fail later, once per file.
    pub fn validate(&self) -> Result<()> {
        if self.encode.audio_bitrate.trim().is_empty() {
            return Err(VidshrinkError::Config("audio_bitrate must not be empty".to_string()));
        }
        if self.engine.binary_path.trim().is_empty() {
            return Err(VidshrinkError::Config("engine binary_path must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_follow_recommended_settings() {
        let config = Config::default();
        assert_eq!(config.engine.binary_path, "ffmpeg");
        assert!(config.encode.ten_bit);
        assert_eq!(config.encode.audio_bitrate, "96k");
        assert_eq!(config.encode.quality, 28);
        assert_eq!(config.encode.target_resolution.to_string(), "1280x720");
        assert_eq!(config.output.suffix, "_converted");
        assert!(!config.output.same_dir);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vidshrink.toml");

        let mut config = Config::default();
        config.encode.quality = 22;
        config.output.output_root = Some(PathBuf::from("/srv/out"));
        config.output.ignore_suffix = Some("_converted".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.encode.quality, 22);
        assert_eq!(loaded.output.output_root, Some(PathBuf::from("/srv/out")));
        assert_eq!(loaded.output.ignore_suffix.as_deref(), Some("_converted"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        let content = "[output]\nsuffix = \"\"\nsame_dir = true\ndelete_original = false\n";
        std::fs::write(&path, content).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.output.same_dir);
        assert_eq!(config.output.suffix, "");
        assert_eq!(config.engine.binary_path, "ffmpeg");
        assert_eq!(config.encode.quality, 28);
    }

    fn encode_section(resolution: &str) -> String {
        format!(
            "[encode]\nten_bit = false\naudio_bitrate = \"128k\"\nquality = 24\n\
             target_resolution = \"{}\"\nprefer_hardware = true\noverwrite_existing = true\n",
            resolution
        )
    }

    #[test]
    fn test_resolution_read_as_string() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encode.toml");
        std::fs::write(&path, encode_section("1920x1080")).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config.encode.target_resolution,
            Resolution {
                width: 1920,
                height: 1080
            }
        );

        let written = toml::to_string(&config).unwrap();
        assert!(written.contains("target_resolution = \"1920x1080\""));
    }

    #[test]
    fn test_invalid_resolution_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encode.toml");
        std::fs::write(&path, encode_section("720p")).unwrap();

        assert!(matches!(Config::from_file(&path), Err(VidshrinkError::Config(_))));
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[engine\nbinary_path = ").unwrap();
        assert!(matches!(Config::from_file(&path), Err(VidshrinkError::Config(_))));
    }
}
