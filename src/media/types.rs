use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Both,
}

impl MediaKind {
    pub fn from_components(has_video: bool, has_audio: bool) -> Option<Self> {
        match (has_video, has_audio) {
            (true, true) => Some(MediaKind::Both),
            (true, false) => Some(MediaKind::Video),
            (false, true) => Some(MediaKind::Audio),
            (false, false) => None,
        }
    }

    pub fn has_video(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Both)
    }

    pub fn has_audio(self) -> bool {
        matches!(self, MediaKind::Audio | MediaKind::Both)
    }
}

/// One entry of the engine's format manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub id: String,
    pub kind: MediaKind,
    pub container: String,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub audio_bitrate_kbps: Option<f64>,
    pub approx_size_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct VideoManifest {
    pub title: String,
    pub duration: Option<String>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub formats: Vec<StreamDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading(ProgressSample),
    Finished { filename: String },
    Error { message: Option<String> },
    /// The transfer starts over with another selector.
    Retrying { format: String },
}

/// Which formats the engine should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelector {
    Itag(String),
    Best,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub format: FormatSelector,
    pub audio_only: bool,
}

impl DownloadRequest {
    /// The selector string handed to the engine.
    pub fn format_spec(&self) -> String {
        match (&self.format, self.audio_only) {
            (FormatSelector::Itag(itag), false) => format!("{itag}+bestaudio/best"),
            (FormatSelector::Itag(itag), true) => itag.clone(),
            (FormatSelector::Best, false) => "best".to_string(),
            (FormatSelector::Best, true) => "bestaudio/best".to_string(),
        }
    }

    pub fn with_fallback(&self) -> Self {
        Self {
            format: FormatSelector::Best,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub file_path: Option<PathBuf>,
}
