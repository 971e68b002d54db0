use crate::error::{Error, Result};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROBE_URL: &str = "https://www.youtube.com";

/// Pre-flight reachability check run before talking to the engine.
pub struct ConnectivityProbe {
    url: String,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub async fn check(&self) -> Result<()> {
        debug!("Probing connectivity via {}", self.url);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::NoConnectivity(format!("failed to create HTTP client: {e}")))?;

        // Any HTTP answer proves the network path works.
        client
            .head(&self.url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Error::NoConnectivity(e.to_string()))
    }
}
