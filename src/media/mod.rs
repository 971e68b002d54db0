mod connectivity;
mod engine;
mod formats;
mod progress;
mod transcode;
mod types;
mod url;
mod ytdlp;

pub use connectivity::{ConnectivityProbe, DEFAULT_PROBE_URL};
pub use engine::Engine;
pub use formats::{itag_of, select_formats, ContainerPolicy, FormatChoice, Selection};
pub use progress::{NoticeLevel, Notification, ProgressAggregator, ProgressSnapshot};
pub use transcode::Transcoder;
pub use types::{
    DownloadOutcome, DownloadRequest, FormatSelector, MediaKind, ProgressEvent, ProgressSample,
    StreamDescriptor, VideoManifest,
};
pub use url::is_youtube_url;
pub use ytdlp::YtDlpEngine;

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Marks an operation on one URL as running until dropped.
struct InFlight<'a> {
    running: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct MediaDownloader {
    engine: Box<dyn Engine>,
    transcoder: Option<Transcoder>,
    probe: Option<ConnectivityProbe>,
    audio_format: String,
    audio_quality: String,
    catalog_cache: Mutex<HashMap<String, Arc<VideoManifest>>>,
    running: Mutex<HashSet<String>>,
    workers: Semaphore,
}

impl MediaDownloader {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        info!("Media downloader initialized with {}", engine.name());

        Self {
            engine,
            transcoder: None,
            probe: None,
            audio_format: "mp3".to_string(),
            audio_quality: "192k".to_string(),
            catalog_cache: Mutex::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
            workers: Semaphore::new(DEFAULT_MAX_CONCURRENT),
        }
    }

    pub fn with_transcoder(mut self, transcoder: Option<Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_probe(mut self, probe: Option<ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_max_concurrent(mut self, workers: usize) -> Self {
        self.workers = Semaphore::new(workers.max(1));
        self
    }

    pub fn with_audio_output(mut self, format: &str, quality: &str) -> Self {
        self.audio_format = format.to_string();
        self.audio_quality = quality.to_string();
        self
    }

    pub fn can_transcode(&self) -> bool {
        self.transcoder.is_some()
    }

    /// Returns the format manifest for `url`, served from the session cache
    /// when the same URL was already queried.
    pub async fn fetch_catalog(&self, url: &str) -> Result<Arc<VideoManifest>> {
        let url = validate_url(url)?;

        if let Some(manifest) = self.cached(url) {
            debug!("Catalog cache hit for {}", url);
            return Ok(manifest);
        }

        let _running = self.begin("fetch", url)?;
        self.check_connectivity().await?;

        info!("Fetching catalog for {}", url);
        let manifest = Arc::new(self.engine.fetch_manifest(url).await?);

        self.catalog_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Arc::clone(&manifest));

        Ok(manifest)
    }

    /// Runs one transfer on the worker pool. A failed transfer is retried once
    /// with the generic best selector before giving up.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadOutcome> {
        let url = validate_url(&request.url)?;
        if !request.output_dir.is_dir() {
            return Err(Error::MissingFolder(request.output_dir.clone()));
        }

        let _running = self.begin("download", url)?;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| Error::DownloadFailed("worker pool is closed".to_string()))?;
        self.check_connectivity().await?;

        let outcome = match self.engine.download(request, progress.clone()).await {
            Ok(outcome) => outcome,
            Err(Error::DownloadFailed(message)) if request.format != FormatSelector::Best => {
                warn!(
                    "{} failed for {}: {}. Retrying with the best available format",
                    self.engine.name(),
                    url,
                    message
                );
                let fallback = request.with_fallback();
                let _ = progress.send(ProgressEvent::Retrying {
                    format: fallback.format_spec(),
                });
                match self.engine.download(&fallback, progress).await {
                    Ok(outcome) => outcome,
                    Err(retry_error) => {
                        warn!("Fallback download failed too: {}", retry_error);
                        return Err(Error::DownloadFailed(message));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        if request.audio_only {
            return Ok(self.finish_audio(outcome).await);
        }

        Ok(outcome)
    }

    pub async fn test_setup(&self) -> Result<()> {
        info!("Testing media downloader setup...");

        if !self.engine.test_availability().await {
            return Err(Error::ToolMissing("yt-dlp"));
        }

        match &self.transcoder {
            Some(transcoder) => match transcoder.version().await {
                Some(version) => info!("✅ ffmpeg is available: {}", version),
                None => warn!("❌ ffmpeg at {} did not run", transcoder.path().display()),
            },
            None => warn!("⚠️  ffmpeg not found, audio conversion will be disabled"),
        }

        Ok(())
    }

    async fn finish_audio(&self, outcome: DownloadOutcome) -> DownloadOutcome {
        let Some(source) = outcome.file_path.clone() else {
            return outcome;
        };

        let Some(transcoder) = &self.transcoder else {
            warn!(
                "ffmpeg not found, keeping {} without conversion",
                source.display()
            );
            return outcome;
        };

        match transcoder
            .to_audio(&source, &self.audio_format, &self.audio_quality)
            .await
        {
            Ok(converted) => DownloadOutcome {
                file_path: Some(converted),
            },
            Err(e) => {
                warn!("Keeping {} unconverted: {}", source.display(), e);
                outcome
            }
        }
    }

    async fn check_connectivity(&self) -> Result<()> {
        match &self.probe {
            Some(probe) => probe.check().await,
            None => Ok(()),
        }
    }

    fn cached(&self, url: &str) -> Option<Arc<VideoManifest>> {
        self.catalog_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    fn begin(&self, operation: &str, url: &str) -> Result<InFlight<'_>> {
        let key = format!("{operation}:{url}");
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(key.clone()) {
            return Err(Error::Busy(url.to_string()));
        }

        Ok(InFlight {
            running: &self.running,
            key,
        })
    }
}

fn validate_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if is_youtube_url(url) {
        Ok(url)
    } else {
        Err(Error::InvalidUrl(url.to_string()))
    }
}
