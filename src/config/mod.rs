//! Application Configuration
//!
//! Pipeline tuning and furigana lookup settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Frame admission settings
    pub scheduler: SchedulerSettings,
    /// Text detection filter settings
    pub detection: DetectionSettings,
    /// Background brightness sampling settings
    pub luminance: LuminanceSettings,
    /// Reading lookup settings
    pub furigana: FuriganaSettings,
}

/// Frame admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Process every Nth frame
    pub sample_interval: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { sample_interval: 3 }
    }
}

/// Text detection filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum share of Japanese characters for a line to survive (0.0 - 1.0)
    pub japanese_ratio_threshold: f32,
    /// Minimum engine confidence for a line to survive (0.0 - 1.0)
    pub min_confidence: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            japanese_ratio_threshold: 0.30,
            min_confidence: 0.0,
        }
    }
}

/// Background brightness sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminanceSettings {
    /// Sample brightness for adaptive overlay contrast
    pub enabled: bool,
    /// Sample points per axis
    pub grid_size: u32,
    /// Size of the global center region relative to the frame
    pub center_fraction: f32,
}

impl Default for LuminanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grid_size: 5,
            center_fraction: 0.20,
        }
    }
}

/// Reading lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuriganaSettings {
    /// Remote batch lookup endpoint; remote tier disabled when unset
    pub endpoint: Option<String>,
    /// Remote request timeout in milliseconds
    pub timeout_ms: u64,
    /// Local dictionary database; defaults to the data directory
    pub dictionary_path: Option<PathBuf>,
}

impl Default for FuriganaSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 3000,
            dictionary_path: None,
        }
    }
}

impl FuriganaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved local dictionary path
    pub fn dictionary_path(&self) -> Result<PathBuf> {
        match &self.dictionary_path {
            Some(path) => Ok(path.clone()),
            None => Ok(crate::storage::get_data_dir()?.join("dictionary.sqlite3")),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.scheduler.sample_interval, 3);

        assert!((config.detection.japanese_ratio_threshold - 0.30).abs() < 0.001);
        assert_eq!(config.detection.min_confidence, 0.0);

        assert!(config.luminance.enabled);
        assert_eq!(config.luminance.grid_size, 5);
        assert!((config.luminance.center_fraction - 0.20).abs() < 0.001);

        assert!(config.furigana.endpoint.is_none());
        assert_eq!(config.furigana.timeout(), Duration::from_secs(3));
        assert!(config.furigana.dictionary_path.is_none());
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = AppConfig::default();
        config.scheduler.sample_interval = 5;
        config.furigana.endpoint = Some("http://localhost:8080/furigana".to_string());
        config.detection.japanese_ratio_threshold = 0.5;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.scheduler.sample_interval, 5);
        assert_eq!(parsed.furigana.endpoint.as_deref(), Some("http://localhost:8080/furigana"));
        assert!((parsed.detection.japanese_ratio_threshold - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[scheduler]\nsample_interval = 2\n").unwrap();
        assert_eq!(parsed.scheduler.sample_interval, 2);
        assert_eq!(parsed.luminance.grid_size, 5);
        assert_eq!(parsed.furigana.timeout_ms, 3000);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.furigana.dictionary_path = Some(PathBuf::from("/tmp/dict.sqlite3"));

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.scheduler.sample_interval, config.scheduler.sample_interval);
        assert_eq!(loaded.furigana.dictionary_path().unwrap(), PathBuf::from("/tmp/dict.sqlite3"));
    }

    #[test]
    fn test_load_furigana_section() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "[furigana]\nendpoint = \"https://furigana.example/lookup\"\ntimeout_ms = 500\n\n[luminance]\nenabled = false"
        )
        .unwrap();

        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.furigana.endpoint.as_deref(), Some("https://furigana.example/lookup"));
        assert_eq!(loaded.furigana.timeout(), Duration::from_millis(500));
        assert!(loaded.furigana.dictionary_path.is_none());
        assert!(!loaded.luminance.enabled);
        assert_eq!(loaded.scheduler.sample_interval, 3);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
