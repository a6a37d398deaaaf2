use std::{
    future::Future,
    path::{Path, PathBuf},
};

use tokio_util::sync::CancellationToken;

use crate::{
    error::{BangumiError, BangumiResult},
    fetch::{resume_markers, StreamFetcher},
    journal::{EnumerationLog, EpisodeJournal, EpisodeRecord, EpisodeStatus, RecordId},
    merge::Muxer,
    model::{DownloadTarget, Episode, StreamKind},
    source::MetadataSource,
    util::sanitize_filename,
    DEFAULT_QUALITY,
};

pub const DEFAULT_REFERER: &str = "https://www.bilibili.com";
pub const DEFAULT_CONNECTIONS: u32 = 16;

const AUDIO_EXTENSION: &str = "ogg";
const MERGED_EXTENSION: &str = "mkv";

/// Settings of a single run, fixed before the first episode is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub dest_dir: PathBuf,
    /// Requested quality tier, used unchanged for every episode.
    pub quality: u32,
    /// Delete the audio and video files after a successful merge.
    pub cleanup_after_merge: bool,
    /// Only episodes whose sanitized title contains this text are processed.
    pub keyword: Option<String>,
    /// Connections per file handed to the downloader.
    pub connections: u32,
    /// Headers sent with every stream download.
    pub headers: Vec<(String, String)>,
    /// Referer for episodes without a share url.
    pub referer: String,
}

impl PipelineOptions {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            quality: DEFAULT_QUALITY,
            cleanup_after_merge: false,
            keyword: None,
            connections: DEFAULT_CONNECTIONS,
            headers: Vec::new(),
            referer: DEFAULT_REFERER.to_string(),
        }
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn cleanup_after_merge(mut self, cleanup: bool) -> Self {
        self.cleanup_after_merge = cleanup;
        self
    }

    pub fn keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword.filter(|k| !k.is_empty());
        self
    }

    pub fn connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }
}

/// What happened to one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Merged(PathBuf),
    /// The merged file was left by an earlier run.
    AlreadyMerged(PathBuf),
    /// Title does not contain the keyword.
    Filtered,
    /// The server offers no format at all.
    Unplayable,
    /// No video stream matches the selected quality and codec.
    VideoAbsent,
    AudioAbsent,
    MetadataFailed(String),
    AudioFailed,
    VideoFailed,
    MergeFailed(String),
    /// Any other per-episode error, such as a filesystem failure.
    Failed(String),
}

impl EpisodeOutcome {
    pub fn merged_path(&self) -> Option<&Path> {
        match self {
            Self::Merged(path) | Self::AlreadyMerged(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One outcome per episode, in input order.
    pub outcomes: Vec<EpisodeOutcome>,
}

impl RunReport {
    pub fn merged_files(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(EpisodeOutcome::merged_path)
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Drives every episode through format selection, download and merge.
///
/// ```text
///  ┌──────────────┐ play_info ┌────────────────┐
///  │ Metadata     ├──────────►│ select         │
///  │ Source       │           │ (format/codec) │
///  └──────────────┘           └───────┬────────┘
///                                     │ audio + video urls
///                       ┌─────────────▼─────────────┐
///                       │    AcquisitionPipeline    │
///                       │  partial check → fetch ×2 ├──► EpisodeJournal
///                       │  → merge → cleanup        │
///                       └──────┬─────────────┬──────┘
///                              │             │
///                     ┌────────▼──────┐ ┌────▼────────┐
///                     │ StreamFetcher │ │ Muxer       │
///                     │ aria2c / axel │ │ ffmpeg      │
///                     └───────────────┘ └─────────────┘
/// ```
///
/// Episodes are processed one after another. A failing episode is recorded
/// in the journal and skipped; only an invalid destination, a journal that
/// can not be created, or cancellation end the run early.
pub struct AcquisitionPipeline<S, F, M> {
    source: S,
    fetcher: F,
    muxer: M,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl<S, F, M> AcquisitionPipeline<S, F, M>
where
    S: MetadataSource,
    F: StreamFetcher,
    M: Muxer,
{
    pub fn new(source: S, fetcher: F, muxer: M, options: PipelineOptions) -> Self {
        Self {
            source,
            fetcher,
            muxer,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run when `cancel` fires.
    ///
    /// The running external process is killed and files on disk are left
    /// untouched for the next run to inspect.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    /// Process all episodes and return the merged files.
    pub async fn run(&self, episodes: &[Episode]) -> BangumiResult<Vec<PathBuf>> {
        Ok(self.run_with_report(episodes).await?.merged_files())
    }

    pub async fn run_with_report(&self, episodes: &[Episode]) -> BangumiResult<RunReport> {
        let dest_dir = &self.options.dest_dir;
        if dest_dir.exists() && !dest_dir.is_dir() {
            return Err(BangumiError::InvalidDestination(dest_dir.clone()));
        }
        tokio::fs::create_dir_all(dest_dir).await?;

        if episodes.is_empty() {
            tracing::warn!("No episodes to download.");
        } else {
            tracing::info!("Found {} episode(s) to download.", episodes.len());
        }

        let mut journal =
            EpisodeJournal::create(dest_dir, episodes.len(), self.options.quality).await?;
        let enumeration = EnumerationLog::create(dest_dir).await?;

        let mut report = RunReport::default();
        for (index, episode) in episodes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(BangumiError::Interrupted);
            }

            let outcome = match self
                .process_episode(index, episodes.len(), episode, &mut journal, &enumeration)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!("Error while processing episode {}: {e}", index + 1);
                    EpisodeOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push(outcome);
        }

        let merged = report.merged_files();
        tracing::info!(
            "Download and merge finished. {} file(s) merged:",
            merged.len()
        );
        for file in merged.iter() {
            tracing::info!("  - {}", file.display());
        }

        Ok(report)
    }

    async fn process_episode(
        &self,
        index: usize,
        total: usize,
        episode: &Episode,
        journal: &mut EpisodeJournal,
        enumeration: &EnumerationLog,
    ) -> BangumiResult<EpisodeOutcome> {
        let ordinal = index + 1;

        let play_info = match self
            .cancellable(self.source.play_info(episode, self.options.quality))
            .await?
        {
            Ok(play_info) => play_info,
            Err(e) => {
                tracing::error!(
                    aid = episode.aid,
                    cid = episode.cid,
                    "Failed to fetch formats of episode {ordinal}: {e}"
                );
                return Ok(EpisodeOutcome::MetadataFailed(e.to_string()));
            }
        };

        let Some(selection) = play_info.select(self.options.quality) else {
            tracing::warn!("Episode {ordinal} has no playable format, skipping.");
            return Ok(EpisodeOutcome::Unplayable);
        };
        let Some(video) = selection.video else {
            tracing::warn!("Video absent for episode {ordinal}, skipping.");
            return Ok(EpisodeOutcome::VideoAbsent);
        };
        let Some(audio) = selection.audio else {
            tracing::warn!("Audio absent for episode {ordinal}, skipping.");
            return Ok(EpisodeOutcome::AudioAbsent);
        };

        let referer = self.referer_for(episode);
        if let Err(e) = enumeration
            .append(index, episode, &audio.base_url, &video.base_url)
            .await
        {
            tracing::warn!("Failed to write {}: {e}", enumeration.path().display());
        }

        let share_copy = episode
            .share_copy
            .clone()
            .unwrap_or_else(|| format!("Episode_{ordinal}"));
        let title = sanitize_filename(&format!(
            "{share_copy}{}{}",
            selection.format.new_description, selection.format.display_desc
        ));

        if let Some(keyword) = &self.options.keyword {
            if !title.contains(keyword.as_str()) {
                tracing::info!(
                    "Skipping episode {ordinal}/{total}: {title} (keyword filter: {keyword})"
                );
                return Ok(EpisodeOutcome::Filtered);
            }
        }

        tracing::info!(
            "Downloading episode {ordinal}/{total}: {title} (aid={}, cid={})",
            episode.aid,
            episode.cid
        );

        let dest_dir = &self.options.dest_dir;
        let audio_dest = dest_dir.join(format!("{title}.{AUDIO_EXTENSION}"));
        let video_dest = dest_dir.join(format!("{title}.{}", selection.format.extension()));
        let merged_dest = dest_dir.join(format!("{title}.{MERGED_EXTENSION}"));
        let record = EpisodeRecord::new(&title, &audio_dest, &video_dest, &merged_dest);

        if merged_dest.exists() {
            tracing::info!(
                "{} already exists, skipping download and merge.",
                merged_dest.display()
            );
            journal
                .append(record.with_status(EpisodeStatus::SkippedExists))
                .await?;
            return Ok(EpisodeOutcome::AlreadyMerged(merged_dest));
        }

        let audio_present = check_existing(&audio_dest, StreamKind::Audio).await?;
        let video_present = check_existing(&video_dest, StreamKind::Video).await?;

        let mut record_id = None;
        if audio_present && video_present {
            tracing::info!("Audio and video of {title} already exist, merging directly.");
        } else {
            let id = journal.append(record.clone()).await?;
            record_id = Some(id);

            let mut audio_fetched = false;
            if audio_present {
                tracing::info!("Audio file exists, skipping download: {}", audio_dest.display());
            } else {
                tracing::info!("Downloading audio...");
                let target = self.download_target(&audio.base_url, &audio_dest, &referer);
                if let Err(e) = self.cancellable(self.fetcher.fetch(&target)).await? {
                    tracing::error!("Failed to download audio of episode {ordinal}, skipping: {e}");
                    journal.set_status(id, EpisodeStatus::AudioFailed).await?;
                    return Ok(EpisodeOutcome::AudioFailed);
                }
                audio_fetched = true;
            }

            if video_present {
                tracing::info!("Video file exists, skipping download: {}", video_dest.display());
            } else {
                tracing::info!("Downloading video...");
                let target = self.download_target(&video.base_url, &video_dest, &referer);
                if let Err(e) = self.cancellable(self.fetcher.fetch(&target)).await? {
                    tracing::error!("Failed to download video of episode {ordinal}, skipping: {e}");
                    journal.set_status(id, EpisodeStatus::VideoFailed).await?;
                    // audio left by an earlier run is kept for the next attempt
                    if audio_fetched {
                        remove_if_exists(&audio_dest).await;
                    }
                    return Ok(EpisodeOutcome::VideoFailed);
                }
            }
        }

        tracing::info!("Merging episode {ordinal}: {title}...");
        let merging_dest = dest_dir.join(format!("{title}.part.{MERGED_EXTENSION}"));
        let merged = match self
            .cancellable(self.muxer.merge(&audio_dest, &video_dest, &merging_dest))
            .await?
        {
            Ok(()) => tokio::fs::rename(&merging_dest, &merged_dest)
                .await
                .map_err(BangumiError::from),
            Err(e) => Err(e),
        };

        let (status, outcome) = match merged {
            Ok(()) => {
                tracing::info!("Episode {ordinal} merged.");
                let cleaned = self.options.cleanup_after_merge
                    && remove_sources(&audio_dest, &video_dest).await;
                (
                    EpisodeStatus::Merged { cleaned },
                    EpisodeOutcome::Merged(merged_dest),
                )
            }
            Err(e) => {
                tracing::error!("Failed to merge episode {ordinal}: {e}");
                remove_if_exists(&merging_dest).await;
                (EpisodeStatus::MergeFailed, EpisodeOutcome::MergeFailed(e.to_string()))
            }
        };
        self.record_status(journal, record_id, record, status).await?;

        Ok(outcome)
    }

    async fn record_status(
        &self,
        journal: &mut EpisodeJournal,
        id: Option<RecordId>,
        record: EpisodeRecord,
        status: EpisodeStatus,
    ) -> BangumiResult<()> {
        match id {
            Some(id) => journal.set_status(id, status).await,
            None => journal.append(record.with_status(status)).await.map(|_| ()),
        }
    }

    fn referer_for(&self, episode: &Episode) -> String {
        episode
            .share_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.options.referer)
            .to_string()
    }

    fn download_target(&self, url: &str, dest: &Path, referer: &str) -> DownloadTarget {
        let mut target = DownloadTarget::new(url, dest).connections(self.options.connections);
        for (name, value) in self.options.headers.iter() {
            target = target.header(name.as_str(), value.as_str());
        }
        target.header("Referer", referer)
    }

    async fn cancellable<T>(&self, future: impl Future<Output = T>) -> BangumiResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!("Interrupted, leaving downloaded files in place.");
                Err(BangumiError::Interrupted)
            }
            output = future => Ok(output),
        }
    }
}

/// Whether a complete stream file from an earlier run exists at `dest`.
///
/// A file with a resume marker beside it is an interrupted transfer; both are
/// removed so that the stream is downloaded again from scratch.
async fn check_existing(dest: &Path, kind: StreamKind) -> BangumiResult<bool> {
    if !dest.exists() {
        return Ok(false);
    }

    let markers: Vec<PathBuf> = resume_markers(dest)
        .into_iter()
        .filter(|marker| marker.exists())
        .collect();
    if markers.is_empty() {
        return Ok(true);
    }

    tracing::info!(
        "Download of {kind} file was not finished, deleting and downloading again: {}",
        dest.display()
    );
    tokio::fs::remove_file(dest).await?;
    for marker in markers {
        tokio::fs::remove_file(marker).await?;
    }
    Ok(false)
}

async fn remove_if_exists(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to remove {}: {e}", path.display());
            false
        }
    }
}

async fn remove_sources(audio: &Path, video: &Path) -> bool {
    let audio_removed = remove_if_exists(audio).await;
    let video_removed = remove_if_exists(video).await;
    audio_removed && video_removed
}
