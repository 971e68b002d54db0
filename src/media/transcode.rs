use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

#[cfg(windows)]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BINARY: &str = "ffmpeg";

const COMMON_LOCATIONS: &[&str] = &[
    r"C:\ffmpeg\bin\ffmpeg.exe",
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
];

/// Finds ffmpeg: configured path, then a copy shipped next to the executable,
/// then `PATH`, then well-known install locations.
pub fn locate_ffmpeg(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured ffmpeg path {} does not exist", path.display());
    }

    let bundled = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .into_iter()
        .flat_map(|dir| {
            [
                dir.join("ffmpeg").join("bin").join(FFMPEG_BINARY),
                dir.join(FFMPEG_BINARY),
            ]
        });

    bundled
        .chain(which::which(FFMPEG_BINARY).ok())
        .chain(COMMON_LOCATIONS.iter().map(PathBuf::from))
        .find(|candidate| candidate.is_file())
}

pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    /// Locates ffmpeg, reporting its absence as `ToolMissing`.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        locate_ffmpeg(explicit)
            .map(Self::new)
            .ok_or(Error::ToolMissing("ffmpeg"))
    }

    pub fn path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Converts `source` to an audio file with extension `format`, then
    /// removes the source. Returns the path of the converted file.
    pub async fn to_audio(&self, source: &Path, format: &str, quality: &str) -> Result<PathBuf> {
        let target = source.with_extension(format);
        if target == source {
            debug!("{} is already {}", source.display(), format);
            return Ok(target);
        }

        info!(
            "Converting {} to {} at {}",
            source.display(),
            format,
            quality
        );

        let output = Command::new(&self.ffmpeg)
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(source)
            .arg("-vn")
            .arg("-b:a")
            .arg(quality)
            .arg(&target)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::DownloadFailed(format!(
                "ffmpeg failed to convert {}: {}",
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tokio::fs::remove_file(source).await?;
        info!("Converted to {}", target.display());
        Ok(target)
    }

    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.to_string())
    }
}
