use crate::media::{DEFAULT_MAX_CONCURRENT, DEFAULT_PROBE_URL};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Tool and runtime settings read from `settings.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub tools: ToolSettings,
    pub downloads: DownloadSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`
    pub format: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ToolSettings {
    pub ytdlp: PathBuf,
    pub ffmpeg: Option<PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_concurrent: usize,
    /// Only offer video formats in this container, e.g. `mp4`.
    pub video_container: Option<String>,
    pub merge_format: String,
    pub audio_format: String,
    pub audio_quality: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            video_container: None,
            merge_format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192k".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkSettings {
    pub connectivity_check: bool,
    pub probe_url: String,
    pub probe_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connectivity_check: true,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout_secs: 5,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigIo(format!("failed to read settings from {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::ConfigIo(format!("failed to parse settings in {}: {e}", path.display()))
        })
    }

    /// Loads settings from the first location that exists, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match locate(explicit) {
            Some(path) => Ok((Self::from_file(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    pub fn log_directory(&self) -> PathBuf {
        self.logging.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(super::APP_DIR)
                .join("logs")
        })
    }
}

fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("TUBEGRAB_SETTINGS") {
        return Some(PathBuf::from(path));
    }

    let candidates = [
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        dirs::home_dir().map(|home| home.join(".config")),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(|dir| dir.join(super::APP_DIR).join("settings.toml"))
        .find(|path| path.exists())
}
