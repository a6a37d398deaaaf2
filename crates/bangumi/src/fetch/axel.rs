use std::{ffi::OsString, time::Duration};

use super::DownloadBackend;
use crate::{error::BangumiResult, model::DownloadTarget, util::BangumiPathExt};

/// [axel](https://github.com/axel-download-accelerator/axel) backend.
#[derive(Debug, Clone, Copy)]
pub struct Axel {
    timeout: Option<Duration>,
}

impl Axel {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// `None` lets a single attempt run forever.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Default for Axel {
    fn default() -> Self {
        Self::with_timeout(Some(Self::DEFAULT_TIMEOUT))
    }
}

impl DownloadBackend for Axel {
    const EXECUTABLE: &'static str = "axel";
    const MARKER_EXTENSION: &'static str = "st";
    const MAX_CONNECTIONS: u32 = 16;

    fn args(&self, target: &DownloadTarget, connections: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-n".into(),
            connections.to_string().into(),
            "-o".into(),
            target.dest.as_os_str().into(),
            "--insecure".into(),
        ];

        if let Some(user_agent) = target.user_agent() {
            args.push("-U".into());
            args.push(user_agent.into());
        }
        // axel has no dedicated referer flag
        if let Some(referer) = target.referer() {
            args.push("-H".into());
            args.push(format!("Referer: {referer}").into());
        }
        for (key, value) in target.extra_headers() {
            args.push("-H".into());
            args.push(format!("{key}: {value}").into());
        }

        args.push(target.url.as_str().into());
        args
    }

    fn attempt_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn prepare(&self, target: &DownloadTarget) -> BangumiResult<()> {
        // A state file without its target makes axel refuse to start.
        let marker = target.dest.with_appended_extension(Self::MARKER_EXTENSION);
        if !target.dest.exists() && marker.exists() {
            tracing::warn!("Removing orphaned state file {}", marker.display());
            tokio::fs::remove_file(&marker).await?;
        }
        Ok(())
    }
}
