use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BangumiError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("API returned error code {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error("Executable {name} not found: {source}")]
    MissingExecutable {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("Destination {0} exists but is not a directory")]
    InvalidDestination(PathBuf),

    #[error("Download failed: {url} -> {}", dest.display())]
    DownloadError { url: String, dest: PathBuf },

    #[error("Merge failed for {}: {reason}", output.display())]
    MergeError { output: PathBuf, reason: String },

    #[error("Failed to write journal {}: {source}", path.display())]
    JournalError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted by user")]
    Interrupted,
}

impl BangumiError {
    /// Whether this error should stop the whole run instead of a single episode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Interrupted
                | Self::InvalidDestination(_)
                | Self::MissingExecutable { .. }
                | Self::JournalError { .. }
        )
    }
}

pub type BangumiResult<T> = Result<T, BangumiError>;
