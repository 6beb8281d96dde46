use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accumulator::UncaptionedPolicy;
use storyboard_common::GridOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },
    #[error("Failed to read config file: {source}")]
    IoError { source: std::io::Error },
    #[error("Failed to parse config file: {source}")]
    ParseError { source: serde_json::Error },
    #[error("Failed to parse TOML config: {source}")]
    TomlParseError { source: toml::de::Error },
}

/// Runtime configuration for a generation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model identifier sent to the generation endpoint.
    pub model: String,
    /// Base URL of the generation endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// What to do with an image that arrives with no preceding text.
    #[serde(default)]
    pub uncaptioned_policy: UncaptionedPolicy,
    /// Seconds of stream silence before a "still working" notice.
    pub still_working_secs: u64,
    /// Composite grid defaults.
    #[serde(default)]
    pub grid: GridOptions,
    /// Where generated slides and composites are saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            uncaptioned_policy: UncaptionedPolicy::default(),
            still_working_secs: 15,
            grid: GridOptions::default(),
            save_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML or JSON file, chosen by extension.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError { source: e })?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParseError { source: e })
        } else {
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError { source: e })
        }
    }

    /// Load from the first config file found in the usual locations, falling
    /// back to defaults.
    pub fn load_with_fallback() -> Self {
        let config_paths = [
            ".storyboard/config.toml",
            ".storyboard/config.json",
            "storyboard.config.toml",
            "storyboard.config.json",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::load_from_file(path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {path}");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {path}: {e}");
                    }
                }
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            model: "gemini-1.5-flash".to_string(),
            still_working_secs: 30,
            uncaptioned_policy: UncaptionedPolicy::PlaceholderCaption,
            ..Config::default()
        };
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.model, "gemini-1.5-flash");
        assert_eq!(loaded.still_working_secs, 30);
        assert_eq!(
            loaded.uncaptioned_policy,
            UncaptionedPolicy::PlaceholderCaption
        );
    }

    #[test]
    fn json_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"model":"m","base_url":"http://localhost","api_key_env":"KEY","still_working_secs":5}"#,
        )
        .unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.model, "m");
        assert_eq!(loaded.grid.columns, GridOptions::default().columns);
    }

    #[test]
    fn default_grid_has_positive_columns() {
        assert!(Config::default().grid.columns > 0);
    }
}
