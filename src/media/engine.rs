use super::types::{DownloadOutcome, DownloadRequest, ProgressEvent, VideoManifest};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

#[async_trait]
pub trait Engine: Send + Sync {
    /// Human-readable name of the engine
    fn name(&self) -> &'static str;

    /// Query the format manifest for the given URL without downloading
    async fn fetch_manifest(&self, url: &str) -> Result<VideoManifest>;

    /// Transfer the requested format, reporting progress on `progress`
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadOutcome>;

    /// Test if this engine is available on the system
    async fn test_availability(&self) -> bool;
}
