//! Single-file transfers through an external segmented downloader.
//!
//! Every attempt is a fresh process. Resuming an interrupted transfer is left
//! to the backend's own on-disk state, and deciding whether that state can be
//! trusted is left to the caller.

mod aria2;
mod axel;

pub use aria2::Aria2;
pub use axel::Axel;

use std::{
    ffi::OsString,
    fmt,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    str::FromStr,
    time::Duration,
};

use tokio::process::Command;

use crate::{
    error::{BangumiError, BangumiResult},
    model::DownloadTarget,
    util::{
        locate_executable,
        process::{display_command, output_tail},
        BangumiPathExt,
    },
};

pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Sidecar extensions written by the supported backends while a transfer is unfinished.
pub const RESUME_MARKER_EXTENSIONS: [&str; 2] =
    [Aria2::MARKER_EXTENSION, Axel::MARKER_EXTENSION];

/// All resume markers that may exist beside `dest`.
pub fn resume_markers(dest: &Path) -> Vec<PathBuf> {
    RESUME_MARKER_EXTENSIONS
        .iter()
        .map(|ext| dest.with_appended_extension(ext))
        .collect()
}

pub trait StreamFetcher {
    /// Download `target.url` to `target.dest`.
    ///
    /// Must never touch any file other than the target and its resume marker.
    fn fetch(&self, target: &DownloadTarget) -> impl Future<Output = BangumiResult<()>> + Send;
}

/// Command line dialect of an external downloader.
pub trait DownloadBackend: Send + Sync {
    /// Name looked up on `PATH`.
    const EXECUTABLE: &'static str;
    const MARKER_EXTENSION: &'static str;
    const MAX_CONNECTIONS: u32;

    fn args(&self, target: &DownloadTarget, connections: u32) -> Vec<OsString>;

    fn attempt_timeout(&self) -> Option<Duration> {
        None
    }

    /// Called once before the first attempt of every transfer.
    fn prepare(&self, _target: &DownloadTarget) -> impl Future<Output = BangumiResult<()>> + Send {
        async { Ok(()) }
    }
}

pub struct ExternalFetcher<B> {
    backend: B,
    executable: PathBuf,
    max_retry: u32,
    retry_pause: Duration,
}

impl<B> ExternalFetcher<B>
where
    B: DownloadBackend,
{
    pub fn new(backend: B) -> BangumiResult<Self> {
        let executable = locate_executable(B::EXECUTABLE)?;
        Ok(Self::with_executable(backend, executable))
    }

    pub fn with_executable(backend: B, executable: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            executable: executable.into(),
            max_retry: DEFAULT_MAX_RETRY,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }

    pub fn retry_pause(mut self, retry_pause: Duration) -> Self {
        self.retry_pause = retry_pause;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn command_args(&self, target: &DownloadTarget) -> Vec<OsString> {
        let connections = target.connections.clamp(1, B::MAX_CONNECTIONS);
        self.backend.args(target, connections)
    }

    async fn attempt(&self, args: &[OsString]) -> Result<(), String> {
        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.backend.attempt_timeout() {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| format!("timed out after {}s", limit.as_secs()))?,
            None => command.output().await,
        };
        let output = output.map_err(|e| format!("failed to run {}: {e}", B::EXECUTABLE))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{}: {}",
                output.status,
                output_tail(&output.stderr)
            ))
        }
    }
}

impl<B> StreamFetcher for ExternalFetcher<B>
where
    B: DownloadBackend,
{
    async fn fetch(&self, target: &DownloadTarget) -> BangumiResult<()> {
        tokio::fs::create_dir_all(target.dest_dir()).await?;
        self.backend.prepare(target).await?;

        let args = self.command_args(target);
        tracing::info!(
            "Executing download command: {}",
            display_command(&self.executable, &args)
        );

        for attempt in 1..=self.max_retry {
            match self.attempt(&args).await {
                Ok(()) => {
                    tracing::info!(dest = %target.dest.display(), "Download successful");
                    return Ok(());
                }
                Err(reason) => {
                    tracing::warn!(
                        url = %target.url,
                        "Attempt {attempt}/{} failed: {reason}",
                        self.max_retry
                    );
                }
            }

            if attempt < self.max_retry {
                tracing::info!("Retrying... ({attempt}/{})", self.max_retry);
                tokio::time::sleep(self.retry_pause).await;
            }
        }

        tracing::error!(url = %target.url, "All {} attempts failed", self.max_retry);
        Err(BangumiError::DownloadError {
            url: target.url.clone(),
            dest: target.dest.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    Aria2,
    #[default]
    Axel,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aria2" | "aria2c" => Ok(Self::Aria2),
            "axel" => Ok(Self::Axel),
            _ => Err(format!("unknown downloader: {s} (expected aria2 or axel)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aria2 => write!(f, "aria2"),
            Self::Axel => write!(f, "axel"),
        }
    }
}

/// The downloader chosen at startup.
pub enum SegmentedFetcher {
    Aria2(ExternalFetcher<Aria2>),
    Axel(ExternalFetcher<Axel>),
}

impl SegmentedFetcher {
    /// Locate the backend executable. Fails if it is not installed.
    pub fn new(kind: BackendKind, max_retry: u32) -> BangumiResult<Self> {
        Ok(match kind {
            BackendKind::Aria2 => Self::Aria2(ExternalFetcher::new(Aria2)?.max_retry(max_retry)),
            BackendKind::Axel => {
                Self::Axel(ExternalFetcher::new(Axel::default())?.max_retry(max_retry))
            }
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Aria2(_) => BackendKind::Aria2,
            Self::Axel(_) => BackendKind::Axel,
        }
    }
}

impl StreamFetcher for SegmentedFetcher {
    async fn fetch(&self, target: &DownloadTarget) -> BangumiResult<()> {
        match self {
            Self::Aria2(fetcher) => fetcher.fetch(target).await,
            Self::Axel(fetcher) => fetcher.fetch(target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_markers() {
        assert_eq!(
            resume_markers(Path::new("/dl/ep1.ogg")),
            vec![
                PathBuf::from("/dl/ep1.ogg.aria2"),
                PathBuf::from("/dl/ep1.ogg.st")
            ]
        );
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!("aria2".parse::<BackendKind>(), Ok(BackendKind::Aria2));
        assert_eq!("Aria2c".parse::<BackendKind>(), Ok(BackendKind::Aria2));
        assert_eq!("AXEL".parse::<BackendKind>(), Ok(BackendKind::Axel));
        assert!("wget".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::default().to_string(), "axel");
    }

    #[test]
    fn test_connections_are_capped() {
        let fetcher = ExternalFetcher::with_executable(Aria2, "/usr/bin/aria2c");
        let target = DownloadTarget::new("https://example.com/v.m4s", "/dl/v.flv").connections(64);
        let args = fetcher.command_args(&target);
        assert_eq!(args[0], "-x");
        assert_eq!(args[1], "16");

        let target = target.connections(0);
        let args = fetcher.command_args(&target);
        assert_eq!(args[1], "1");
    }
}
