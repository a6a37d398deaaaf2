#![cfg(unix)]

use bangumi::{
    merge::{FfmpegMuxer, Muxer},
    BangumiError,
};

use crate::fetch::{calls, script};

#[tokio::test]
async fn test_ffmpeg_merge() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // writes to its last argument
    let ffmpeg = script(
        dir.path(),
        "ffmpeg",
        "for last; do :; done\necho merged > \"$last\"",
    )?;
    let output = dir.path().join("show").join("ep1.mkv");

    FfmpegMuxer::with_executable(ffmpeg)
        .merge(
            &dir.path().join("ep1.ogg"),
            &dir.path().join("ep1.flv"),
            &output,
        )
        .await?;

    assert_eq!(std::fs::read_to_string(&output)?, "merged\n");
    let calls = calls(dir.path(), "ffmpeg");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("-y -i "));
    assert!(calls[0].contains("-c copy -map 0:v -map 1:a"));

    Ok(())
}

#[tokio::test]
async fn test_ffmpeg_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let ffmpeg = script(
        dir.path(),
        "ffmpeg",
        "echo 'ep1.flv: Invalid data found when processing input' >&2\nexit 1",
    )?;
    let output = dir.path().join("ep1.mkv");

    let result = FfmpegMuxer::with_executable(ffmpeg)
        .merge(&dir.path().join("ep1.ogg"), &dir.path().join("ep1.flv"), &output)
        .await;

    match result {
        Err(BangumiError::MergeError { output: failed, reason }) => {
            assert_eq!(failed, output);
            assert!(reason.contains("Invalid data found"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}
