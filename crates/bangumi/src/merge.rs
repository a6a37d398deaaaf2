use std::{
    ffi::OsString,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use crate::{
    error::{BangumiError, BangumiResult},
    util::{
        locate_executable,
        process::{display_command, output_tail},
    },
};

pub trait Muxer {
    /// Join one audio and one video elementary stream into `output`.
    ///
    /// A single attempt. Failures here usually mean broken inputs, so they
    /// are reported rather than retried.
    fn merge(
        &self,
        audio: &Path,
        video: &Path,
        output: &Path,
    ) -> impl Future<Output = BangumiResult<()>> + Send;
}

/// Remux with the ffmpeg CLI, copying both streams without re-encoding.
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
}

impl FfmpegMuxer {
    pub fn new() -> BangumiResult<Self> {
        Ok(Self::with_executable(locate_executable("ffmpeg")?))
    }

    pub fn with_executable(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn args(audio: &Path, video: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c".into(),
            "copy".into(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "1:a".into(),
            output.into(),
        ]
    }
}

impl Muxer for FfmpegMuxer {
    async fn merge(&self, audio: &Path, video: &Path, output: &Path) -> BangumiResult<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = Self::args(audio, video, output);
        tracing::info!(
            "Executing merge command: {}",
            display_command(&self.ffmpeg, &args)
        );

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let reason = match result {
            Ok(process) if process.status.success() => {
                tracing::info!("Merge successful: {}", output.display());
                return Ok(());
            }
            Ok(process) => format!("{}: {}", process.status, output_tail(&process.stderr)),
            Err(e) => format!("failed to run ffmpeg: {e}"),
        };

        tracing::error!("Merge failed for {}: {reason}", output.display());
        Err(BangumiError::MergeError {
            output: output.to_path_buf(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args() {
        let args = FfmpegMuxer::args(
            Path::new("/dl/ep.ogg"),
            Path::new("/dl/ep.flv"),
            Path::new("/dl/ep.mkv"),
        );
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/dl/ep.flv",
                "-i",
                "/dl/ep.ogg",
                "-c",
                "copy",
                "-map",
                "0:v",
                "-map",
                "1:a",
                "/dl/ep.mkv"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = FfmpegMuxer::with_executable(dir.path().join("no-such-ffmpeg"));
        let output = dir.path().join("out").join("ep.mkv");

        let result = muxer
            .merge(&dir.path().join("ep.ogg"), &dir.path().join("ep.flv"), &output)
            .await;
        assert!(matches!(result, Err(BangumiError::MergeError { output: ref o, .. }) if o == &output));
        // output directory is created before invoking ffmpeg
        assert!(output.parent().unwrap().is_dir());
    }
}
