use super::{
    engine::Engine,
    types::{
        DownloadOutcome, DownloadRequest, MediaKind, ProgressEvent, ProgressSample,
        StreamDescriptor, VideoManifest,
    },
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_MARKER: &str = "tubegrab-progress|";
const FILE_MARKER: &str = "tubegrab-file|";
const PROGRESS_TEMPLATE: &str = "download:tubegrab-progress|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";
const FILE_TEMPLATE: &str = "after_move:tubegrab-file|%(filepath)s";

pub struct YtDlpEngine {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
    merge_format: String,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>, ffmpeg: Option<PathBuf>, merge_format: &str) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg,
            merge_format: merge_format.to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .env("PYTHONIOENCODING", "UTF-8")
            .env("PYTHONUTF8", "1")
            .kill_on_drop(true);
        command
    }

    fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let output_template = request.output_dir.join("%(title)s.%(ext)s");
        let mut args = vec![
            "--format".to_string(),
            request.format_spec(),
            "--output".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            FILE_TEMPLATE.to_string(),
        ];

        if !request.audio_only {
            args.push("--merge-output-format".to_string());
            args.push(self.merge_format.clone());
        }

        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_manifest(&self, url: &str) -> Result<VideoManifest> {
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = tokio::time::timeout(
            MANIFEST_TIMEOUT,
            self.command()
                .arg("--dump-json")
                .arg("--no-download")
                .arg("--no-warnings")
                .arg("--no-playlist")
                .arg(url)
                .output(),
        )
        .await
        .map_err(|_| {
            Error::ExtractionFailed(format!(
                "timed out after {}s",
                MANIFEST_TIMEOUT.as_secs()
            ))
        })??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExtractionFailed(error.trim().to_string()));
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::ExtractionFailed(format!("unreadable metadata: {e}")))?;

        let manifest = parse_manifest(&json);
        debug!(
            "yt-dlp reported {} usable formats for {}",
            manifest.formats.len(),
            url
        );
        Ok(manifest)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadOutcome> {
        info!(
            "Downloading {} with format {}",
            request.url,
            request.format_spec()
        );

        let mut child = self
            .command()
            .args(self.download_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::DownloadFailed("failed to capture yt-dlp stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::DownloadFailed("failed to capture yt-dlp stderr".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer).await;
            String::from_utf8_lossy(&buffer).into_owned()
        });

        let mut file_path = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(path) = line.strip_prefix(FILE_MARKER) {
                file_path = Some(PathBuf::from(path.trim_end()));
            } else if let Some(event) = parse_progress_line(&line) {
                // The receiver may already be gone; the transfer still runs to completion.
                let _ = progress.send(event);
            } else if !line.trim().is_empty() {
                debug!("yt-dlp: {}", line);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = stderr.trim().to_string();
            warn!("yt-dlp exited with {}: {}", status, message);
            let last_line = message.lines().last().map(str::to_string);
            let _ = progress.send(ProgressEvent::Error { message: last_line });
            return Err(Error::DownloadFailed(message));
        }

        Ok(DownloadOutcome { file_path })
    }

    async fn test_availability(&self) -> bool {
        match self.command().arg("--version").output().await {
            Ok(output) => {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout);
                    info!("✅ yt-dlp is available, version: {}", version.trim());
                    true
                } else {
                    warn!("❌ yt-dlp command failed");
                    false
                }
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        }
    }
}

pub fn parse_manifest(json: &Value) -> VideoManifest {
    let formats = json["formats"]
        .as_array()
        .map(|formats| formats.iter().filter_map(parse_format).collect())
        .unwrap_or_default();

    VideoManifest {
        title: json["title"]
            .as_str()
            .unwrap_or("Unknown Title")
            .to_string(),
        duration: json["duration_string"].as_str().map(|s| s.to_string()),
        uploader: json["uploader"].as_str().map(|s| s.to_string()),
        view_count: lenient_u64(&json["view_count"]),
        formats,
    }
}

/// Storyboards and other entries carrying neither audio nor video are skipped.
fn parse_format(format: &Value) -> Option<StreamDescriptor> {
    let id = format["format_id"].as_str()?;
    let has_video = format["vcodec"].as_str() != Some("none");
    let has_audio = format["acodec"].as_str() != Some("none");
    let kind = MediaKind::from_components(has_video, has_audio)?;

    Some(StreamDescriptor {
        id: id.to_string(),
        kind,
        container: format["ext"].as_str().unwrap_or("unknown").to_string(),
        height: lenient_u64(&format["height"]).and_then(|h| u32::try_from(h).ok()),
        frame_rate: format["fps"].as_f64(),
        audio_bitrate_kbps: format["abr"].as_f64(),
        approx_size_bytes: lenient_u64(&format["filesize"])
            .or_else(|| lenient_u64(&format["filesize_approx"])),
    })
}

fn lenient_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Parses one line written through `PROGRESS_TEMPLATE`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim_end().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.splitn(7, '|');

    let status = fields.next()?;
    let downloaded = fields.next()?;
    let total = fields.next()?;
    let total_estimate = fields.next()?;
    let speed = fields.next()?;
    let eta = fields.next()?;
    let filename = fields.next().unwrap_or_default();

    match status {
        "downloading" => Some(ProgressEvent::Downloading(ProgressSample {
            downloaded_bytes: number(downloaded).map_or(0, |v| v as u64),
            total_bytes: number(total)
                .or_else(|| number(total_estimate))
                .map(|v| v as u64),
            speed: number(speed),
            eta_seconds: number(eta).map(|v| v as u64),
            target_path: filename.to_string(),
        })),
        "finished" => Some(ProgressEvent::Finished {
            filename: filename.to_string(),
        }),
        "error" => Some(ProgressEvent::Error { message: None }),
        _ => None,
    }
}

/// yt-dlp prints `NA` for fields it does not know.
fn number(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::FormatSelector;
    use serde_json::json;

    #[test]
    fn test_parse_manifest() {
        let json = json!({
            "title": "Some video",
            "duration_string": "3:33",
            "uploader": "Someone",
            "view_count": 1234567,
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
                {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 129.5, "filesize": 3500000},
                {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "fps": 30, "filesize_approx": 52000000.0},
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360}
            ]
        });

        let manifest = parse_manifest(&json);

        assert_eq!(manifest.title, "Some video");
        assert_eq!(manifest.duration.as_deref(), Some("3:33"));
        assert_eq!(manifest.uploader.as_deref(), Some("Someone"));
        assert_eq!(manifest.view_count, Some(1234567));
        assert_eq!(manifest.formats.len(), 3);

        let audio = &manifest.formats[0];
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(audio.audio_bitrate_kbps, Some(129.5));
        assert_eq!(audio.approx_size_bytes, Some(3500000));

        let video = &manifest.formats[1];
        assert_eq!(video.kind, MediaKind::Video);
        assert_eq!(video.height, Some(1080));
        assert_eq!(video.frame_rate, Some(30.0));
        assert_eq!(video.approx_size_bytes, Some(52000000));

        assert_eq!(manifest.formats[2].kind, MediaKind::Both);
    }

    #[test]
    fn test_parse_manifest_missing_fields() {
        let json = json!({
            "formats": [{"format_id": "22", "ext": "mp4", "height": 720}]
        });

        let manifest = parse_manifest(&json);

        assert_eq!(manifest.title, "Unknown Title");
        assert!(manifest.uploader.is_none());
        assert!(manifest.view_count.is_none());
        // Missing codec fields count as present, as yt-dlp omits them for muxed formats.
        assert_eq!(manifest.formats[0].kind, MediaKind::Both);
    }

    #[test]
    fn test_parse_progress_downloading() {
        let line = "tubegrab-progress|downloading|1048576|NA|4194304.5|524288.0|6|/tmp/My | Video.f137.mp4";

        let event = parse_progress_line(line).unwrap();

        assert_eq!(
            event,
            ProgressEvent::Downloading(ProgressSample {
                downloaded_bytes: 1048576,
                total_bytes: Some(4194304),
                speed: Some(524288.0),
                eta_seconds: Some(6),
                target_path: "/tmp/My | Video.f137.mp4".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_progress_unknown_values() {
        let line = "tubegrab-progress|downloading|2048|NA|NA|NA|NA|out.webm";

        match parse_progress_line(line).unwrap() {
            ProgressEvent::Downloading(sample) => {
                assert_eq!(sample.downloaded_bytes, 2048);
                assert!(sample.total_bytes.is_none());
                assert!(sample.speed.is_none());
                assert!(sample.eta_seconds.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_progress_finished_and_error() {
        assert_eq!(
            parse_progress_line("tubegrab-progress|finished|10|10|NA|NA|NA|/tmp/a.mp4\r\n"),
            Some(ProgressEvent::Finished {
                filename: "/tmp/a.mp4".to_string()
            })
        );
        assert_eq!(
            parse_progress_line("tubegrab-progress|error|NA|NA|NA|NA|NA|"),
            Some(ProgressEvent::Error { message: None })
        );
    }

    #[test]
    fn test_parse_progress_ignores_other_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("tubegrab-progress|downloading|1").is_none());
        assert!(parse_progress_line("tubegrab-file|/tmp/a.mp4").is_none());
    }

    #[test]
    fn test_download_args() {
        let engine = YtDlpEngine::new("yt-dlp", Some(PathBuf::from("/usr/bin/ffmpeg")), "mp4");
        let request = DownloadRequest {
            url: "https://youtu.be/abc".to_string(),
            output_dir: PathBuf::from("/videos"),
            format: FormatSelector::Itag("137".to_string()),
            audio_only: false,
        };

        let args = engine.download_args(&request);

        assert_eq!(&args[..2], ["--format", "137+bestaudio/best"]);
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/usr/bin/ffmpeg"]));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");

        let audio = DownloadRequest {
            audio_only: true,
            ..request
        };
        let args = YtDlpEngine::new("yt-dlp", None, "mp4").download_args(&audio);
        assert!(!args.iter().any(|a| a == "--merge-output-format"));
        assert!(!args.iter().any(|a| a == "--ffmpeg-location"));
    }

    #[tokio::test]
    #[ignore = "Requires yt-dlp installed and network access"]
    async fn test_fetch_manifest_live() {
        let engine = YtDlpEngine::new("yt-dlp", None, "mp4");
        let manifest = engine
            .fetch_manifest("https://www.youtube.com/watch?v=jNQXAC9IVRw")
            .await
            .unwrap();
        assert!(!manifest.formats.is_empty());
    }
}
