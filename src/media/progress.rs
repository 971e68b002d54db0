use super::types::{ProgressEvent, ProgressSample};
use std::fmt;
use std::path::Path;
use tracing::warn;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const NO_ETA: &str = "--:--";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoticeLevel::Info => "INFO",
            NoticeLevel::Success => "SUCCESS",
            NoticeLevel::Warning => "WARNING",
            NoticeLevel::Error => "ERROR",
        })
    }
}

/// A log-worthy event raised while folding progress events.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notification {
    pub fn new(level: NoticeLevel, message: String) -> Self {
        Self { level, message }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub speed_label: String,
    pub eta_label: String,
    pub byte_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LabelError {
    InvalidSpeed(f64),
}

impl fmt::Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelError::InvalidSpeed(speed) => write!(f, "invalid transfer speed {speed}"),
        }
    }
}

/// Folds the event stream of a single transfer into display labels.
///
/// One aggregator belongs to one in-flight transfer. After `Finished` the
/// milestone marker is cleared so the instance can be reused.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    percent: f64,
    speed_label: String,
    eta_label: String,
    byte_label: String,
    last_milestone: u32,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            percent: 0.0,
            speed_label: format_speed(0.0),
            eta_label: NO_ETA.to_string(),
            byte_label: format_bytes(0, None),
            last_milestone: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn speed_label(&self) -> &str {
        &self.speed_label
    }

    pub fn eta_label(&self) -> &str {
        &self.eta_label
    }

    pub fn byte_label(&self) -> &str {
        &self.byte_label
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent,
            speed_label: self.speed_label.clone(),
            eta_label: self.eta_label.clone(),
            byte_label: self.byte_label.clone(),
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> Option<Notification> {
        match event {
            ProgressEvent::Downloading(sample) => self.on_downloading(sample),
            ProgressEvent::Finished { filename } => {
                self.last_milestone = 0;
                self.percent = 100.0;
                Some(Notification::new(
                    NoticeLevel::Success,
                    format!("Download finished: {}", file_name(filename)),
                ))
            }
            ProgressEvent::Retrying { format } => {
                self.reset();
                Some(Notification::new(
                    NoticeLevel::Warning,
                    format!("Retrying with format {format}"),
                ))
            }
            ProgressEvent::Error { message } => Some(Notification::new(
                NoticeLevel::Error,
                format!(
                    "Download error: {}",
                    message.as_deref().unwrap_or("unknown error")
                ),
            )),
        }
    }

    fn on_downloading(&mut self, sample: &ProgressSample) -> Option<Notification> {
        let labels = match derive_labels(sample) {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Skipping progress sample for {}: {}", sample.target_path, e);
                return None;
            }
        };

        let total = sample.total_bytes.filter(|t| *t > 0);
        if let Some(total) = total {
            // Estimated totals can trail the bytes already received.
            self.percent = (sample.downloaded_bytes as f64 * 100.0 / total as f64).min(100.0);
        }
        if let Some(speed_label) = labels.speed {
            self.speed_label = speed_label;
        }
        self.eta_label = labels.eta;
        self.byte_label = labels.bytes;

        if total.is_none() {
            return None;
        }
        let decile = self.percent as u32;
        if decile > 0 && decile % 10 == 0 && decile != self.last_milestone {
            self.last_milestone = decile;
            return Some(Notification::new(
                NoticeLevel::Info,
                format!(
                    "Downloading {}: {:.1}% - {}",
                    file_name(&sample.target_path),
                    self.percent,
                    self.speed_label
                ),
            ));
        }

        None
    }
}

struct Labels {
    speed: Option<String>,
    eta: String,
    bytes: String,
}

fn derive_labels(sample: &ProgressSample) -> Result<Labels, LabelError> {
    let speed = match sample.speed {
        Some(speed) if !speed.is_finite() || speed < 0.0 => {
            return Err(LabelError::InvalidSpeed(speed))
        }
        Some(speed) if speed > 0.0 => Some(format_speed(speed)),
        _ => None,
    };

    Ok(Labels {
        speed,
        eta: format_eta(sample.eta_seconds),
        bytes: format_bytes(sample.downloaded_bytes, sample.total_bytes),
    })
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= MIB {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.2} KB/s", bytes_per_sec / KIB)
    }
}

pub fn format_eta(eta_seconds: Option<u64>) -> String {
    match eta_seconds {
        Some(eta) if eta > 0 => format!("{:02}:{:02}", eta / 60, eta % 60),
        _ => NO_ETA.to_string(),
    }
}

pub fn format_bytes(downloaded: u64, total: Option<u64>) -> String {
    let total_mb = total.filter(|t| *t > 0).map_or(0.0, |t| t as f64 / MIB);
    format!("{:.1} / {:.1} MB", downloaded as f64 / MIB, total_mb)
}

fn file_name(path: &str) -> &str {
    if path.is_empty() {
        return "file";
    }
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}
