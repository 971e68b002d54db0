mod settings;

pub use settings::{DownloadSettings, LoggingSettings, NetworkSettings, Settings, ToolSettings};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const APP_DIR: &str = "tubegrab";
const CONFIG_FILENAME: &str = "config.json";

/// User preferences persisted between runs. Unknown keys in the file are
/// ignored and missing ones take their default.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub last_folder: String,
    pub preferred_quality: String,
    pub audio_only_default: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            last_folder: String::new(),
            preferred_quality: String::new(),
            audio_only_default: false,
            window_width: 700,
            window_height: 600,
        }
    }
}

impl AppConfig {
    pub const KEYS: [&'static str; 5] = [
        "lastFolder",
        "preferredQuality",
        "audioOnlyDefault",
        "windowWidth",
        "windowHeight",
    ];

    /// Sets one field by its on-disk key name.
    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "lastFolder" => self.last_folder = value.to_string(),
            "preferredQuality" => self.preferred_quality = value.to_string(),
            "audioOnlyDefault" => self.audio_only_default = parse_bool(value)?,
            "windowWidth" => self.window_width = parse_dimension(value)?,
            "windowHeight" => self.window_height = parse_dimension(value)?,
            _ => {
                return Err(format!(
                    "unknown key '{}', expected one of: {}",
                    key,
                    Self::KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(format!("'{value}' is not a boolean")),
    }
}

fn parse_dimension(value: &str) -> std::result::Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("'{value}' is not a valid size in pixels"))
}

/// Loads and saves `AppConfig` as a JSON file. Neither direction ever fails
/// towards the caller: problems are logged and defaults take over.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `--config` argument, then `TUBEGRAB_CONFIG`, then the platform config dir.
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::new(path);
        }

        if let Ok(path) = std::env::var("TUBEGRAB_CONFIG") {
            return Self::new(path);
        }

        let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(APP_DIR).join(CONFIG_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AppConfig {
        match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                debug!("Using default config: {}", e);
                AppConfig::default()
            }
        }
    }

    pub fn save(&self, config: &AppConfig) {
        if let Err(e) = self.try_save(config) {
            warn!("Failed to save config to {}: {}", self.path.display(), e);
        }
    }

    fn try_load(&self) -> Result<AppConfig> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::ConfigIo(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::ConfigIo(format!("{}: {}", self.path.display(), e)))
    }

    fn try_save(&self, config: &AppConfig) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(config)
            .map_err(|e| Error::ConfigIo(e.to_string()))?;

        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        assert_eq!(store.load(), AppConfig::default());
        assert_eq!(
            store.load(),
            AppConfig {
                last_folder: String::new(),
                preferred_quality: String::new(),
                audio_only_default: false,
                window_width: 700,
                window_height: 600,
            }
        );
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(ConfigStore::new(&path).load(), AppConfig::default());

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert_eq!(ConfigStore::new(&path).load(), AppConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));
        let config = AppConfig {
            last_folder: "/home/me/Música".to_string(),
            preferred_quality: "720p".to_string(),
            audio_only_default: true,
            window_width: 1024,
            window_height: 768,
        };

        store.save(&config);

        assert_eq!(store.load(), config);
    }

    #[test]
    fn test_file_format_is_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&AppConfig::default());

        let content = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();

        for key in AppConfig::KEYS {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_unknown_fields_ignored_and_missing_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"lastFolder": "/tmp", "theme": "dark"}"#).unwrap();

        let config = ConfigStore::new(&path).load();

        assert_eq!(config.last_folder, "/tmp");
        assert_eq!(config.window_width, 700);
        assert!(!config.audio_only_default);
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("config.json");
        std::fs::create_dir(&path).unwrap();

        ConfigStore::new(&path).save(&AppConfig::default());
        assert!(path.is_dir());
    }

    #[test]
    fn test_set_by_key() {
        let mut config = AppConfig::default();

        config.set("audioOnlyDefault", "on").unwrap();
        config.set("windowWidth", "900").unwrap();
        config.set("preferredQuality", "1080p").unwrap();

        assert!(config.audio_only_default);
        assert_eq!(config.window_width, 900);
        assert_eq!(config.preferred_quality, "1080p");
        assert!(config.set("windowHeight", "tall").is_err());
        assert!(config.set("colour", "red").is_err());
    }
}
