use std::ffi::OsString;

use super::DownloadBackend;
use crate::model::DownloadTarget;

/// [aria2](https://aria2.github.io/) backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aria2;

impl DownloadBackend for Aria2 {
    const EXECUTABLE: &'static str = "aria2c";
    const MARKER_EXTENSION: &'static str = "aria2";
    // aria2c rejects --max-connection-per-server above 16
    const MAX_CONNECTIONS: u32 = 16;

    fn args(&self, target: &DownloadTarget, connections: u32) -> Vec<OsString> {
        let connections = connections.to_string();
        let mut args: Vec<OsString> = vec![
            "-x".into(),
            connections.clone().into(),
            "-s".into(),
            connections.into(),
            "-k".into(),
            "1M".into(),
            "-o".into(),
            target.dest.file_name().unwrap_or_default().into(),
            "-d".into(),
            target.dest_dir().into(),
        ];
        args.extend(
            [
                "--continue=true",
                "--auto-file-renaming=false",
                "--allow-overwrite=true",
                "--check-certificate=false",
                "--console-log-level=warn",
                "--summary-interval=0",
                "--retry-wait=1",
                "--max-tries=0",
            ]
            .map(OsString::from),
        );

        if let Some(user_agent) = target.user_agent() {
            args.push("-U".into());
            args.push(user_agent.into());
        }
        if let Some(referer) = target.referer() {
            args.push("--referer".into());
            args.push(referer.into());
        }
        for (key, value) in target.extra_headers() {
            args.push("--header".into());
            args.push(format!("{key}: {value}").into());
        }

        args.push(target.url.as_str().into());
        args
    }
}
