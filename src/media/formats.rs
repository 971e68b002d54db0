use super::types::StreamDescriptor;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

const MIB: u64 = 1024 * 1024;

/// Restricts which containers are offered in video mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContainerPolicy {
    #[default]
    Any,
    Only(String),
}

impl ContainerPolicy {
    pub fn from_option(container: Option<String>) -> Self {
        match container {
            Some(ext) if !ext.is_empty() => ContainerPolicy::Only(ext),
            _ => ContainerPolicy::Any,
        }
    }

    fn allows(&self, container: &str) -> bool {
        match self {
            ContainerPolicy::Any => true,
            ContainerPolicy::Only(ext) => ext == container,
        }
    }
}

/// A rendered format line. The itag is always the trailing `itag:<id>` part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatChoice {
    label: String,
}

impl FormatChoice {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn itag(&self) -> &str {
        itag_of(&self.label).unwrap_or_default()
    }
}

impl fmt::Display for FormatChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub choices: Vec<FormatChoice>,
    pub best_video: Option<StreamDescriptor>,
}

impl Selection {
    /// First choice whose label mentions `quality` (e.g. "720p" or "mp4").
    pub fn preferred(&self, quality: &str) -> Option<&FormatChoice> {
        if quality.is_empty() {
            return None;
        }
        self.choices.iter().find(|c| c.label.contains(quality))
    }
}

/// Extracts the itag from a rendered choice, or accepts a bare itag.
pub fn itag_of(choice: &str) -> Option<&str> {
    let itag = match choice.rsplit_once("itag:") {
        Some((_, itag)) => itag,
        None => choice,
    }
    .trim();

    if itag.is_empty() {
        None
    } else {
        Some(itag)
    }
}

pub fn select_formats(
    catalog: &[StreamDescriptor],
    audio_only: bool,
    policy: &ContainerPolicy,
) -> Result<Selection> {
    let mut labels = BTreeSet::new();
    let mut best_video: Option<&StreamDescriptor> = None;

    for stream in catalog {
        if audio_only {
            if stream.kind.has_audio() && !stream.kind.has_video() {
                labels.insert(render_audio(stream));
            }
        } else if stream.kind.has_video() && policy.allows(&stream.container) {
            labels.insert(render_video(stream));

            let height = stream.height.unwrap_or(0);
            if best_video.is_none_or(|best| height > best.height.unwrap_or(0)) {
                best_video = Some(stream);
            }
        }
    }

    if labels.is_empty() {
        return Err(Error::NoFormatsAvailable);
    }

    Ok(Selection {
        choices: labels
            .into_iter()
            .rev()
            .map(|label| FormatChoice { label })
            .collect(),
        best_video: best_video.cloned(),
    })
}

fn render_audio(stream: &StreamDescriptor) -> String {
    format!(
        "Audio {}kbps - {} ({}MB) - itag:{}",
        or_unknown(stream.audio_bitrate_kbps),
        stream.container,
        size_mb(stream.approx_size_bytes),
        stream.id
    )
}

fn render_video(stream: &StreamDescriptor) -> String {
    format!(
        "Video {}p {}fps - {} ({}MB) - itag:{}",
        stream.height.unwrap_or(0),
        or_unknown(stream.frame_rate),
        stream.container,
        size_mb(stream.approx_size_bytes),
        stream.id
    )
}

fn or_unknown(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

fn size_mb(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) if b > 0 => (b / MIB).to_string(),
        _ => "?".to_string(),
    }
}
