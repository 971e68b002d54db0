use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("output folder does not exist: {}", .0.display())]
    MissingFolder(PathBuf),

    #[error("no network connectivity: {0}")]
    NoConnectivity(String),

    #[error("{0} not found")]
    ToolMissing(&'static str),

    #[error("no formats available for this video")]
    NoFormatsAvailable,

    #[error("failed to extract video information: {0}")]
    ExtractionFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("an operation is already running for {0}")]
    Busy(String),

    #[error("config I/O failed: {0}")]
    ConfigIo(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors raised before any external call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_) | Error::MissingFolder(_) | Error::Busy(_)
        )
    }
}
