//! Plain-text run journals kept in the destination directory.
//!
//! `download_list.txt` records one line per episode together with its final
//! status and doubles as evidence for idempotent re-runs. `enumerate.txt`
//! keeps the identifiers and stream urls of every episode for debugging.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{
    error::{BangumiError, BangumiResult},
    model::Episode,
    util::BangumiPathExt,
};

pub const JOURNAL_FILE_NAME: &str = "download_list.txt";
pub const ENUMERATION_FILE_NAME: &str = "enumerate.txt";

// trailing space is part of the format
const ENUMERATION_BANNER: &str = "# Bilibili Bangumi Downloader - enumerate \n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    Planned,
    Merged { cleaned: bool },
    AudioFailed,
    VideoFailed,
    MergeFailed,
    SkippedExists,
}

impl EpisodeStatus {
    /// Text written after `# Status: `. Planned entries carry no tag.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Planned => None,
            Self::Merged { cleaned: false } => Some("Merged"),
            Self::Merged { cleaned: true } => Some("Merged (files cleaned)"),
            Self::AudioFailed => Some("Audio Failed"),
            Self::VideoFailed => Some("Video Failed"),
            Self::MergeFailed => Some("Merge Failed"),
            Self::SkippedExists => Some("Skipped (file exists)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub title: String,
    pub audio: String,
    pub video: String,
    pub merged: String,
    pub status: EpisodeStatus,
}

impl EpisodeRecord {
    pub fn new(title: &str, audio: &Path, video: &Path, merged: &Path) -> Self {
        Self {
            title: title.to_string(),
            audio: basename(audio),
            video: basename(video),
            merged: basename(merged),
            status: EpisodeStatus::Planned,
        }
    }

    pub fn with_status(mut self, status: EpisodeStatus) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Display for EpisodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.title, self.audio, self.video, self.merged
        )?;
        if let Some(tag) = self.status.tag() {
            write!(f, " # Status: {tag}")?;
        }
        Ok(())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Index of a record inside an [EpisodeJournal].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(usize);

pub struct EpisodeJournal {
    path: PathBuf,
    header: String,
    records: Vec<EpisodeRecord>,
}

impl EpisodeJournal {
    /// Start a fresh journal in `dir`, replacing the one of a previous run.
    pub async fn create(dir: &Path, total_episodes: usize, quality: u32) -> BangumiResult<Self> {
        let header = format!(
            "# Bilibili Bangumi Downloader - Download List\n\
             # Total episodes: {total_episodes}\n\
             # Download directory: {}\n\
             # Format: Episode Title | Audio File | Video File | Merged File\n\
             # Selected quality: {quality}\n\
             # Status: Planned\n\n",
            dir.display()
        );

        let path = dir.join(JOURNAL_FILE_NAME);
        tokio::fs::write(&path, &header)
            .await
            .map_err(|source| journal_error(&path, source))?;

        Ok(Self {
            path,
            header,
            records: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[EpisodeRecord] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&EpisodeRecord> {
        self.records.get(id.0)
    }

    /// Append a line to the journal file.
    pub async fn append(&mut self, record: EpisodeRecord) -> BangumiResult<RecordId> {
        append_line(&self.path, &format!("{record}\n"))
            .await
            .map_err(|source| journal_error(&self.path, source))?;

        self.records.push(record);
        Ok(RecordId(self.records.len() - 1))
    }

    /// Replace the status of an existing record and rewrite the file.
    pub async fn set_status(&mut self, id: RecordId, status: EpisodeStatus) -> BangumiResult<()> {
        let Some(record) = self.records.get_mut(id.0) else {
            tracing::warn!("Journal record {} does not exist", id.0);
            return Ok(());
        };
        record.status = status;

        let temp_path = self.path.with_appended_extension("tmp");
        let content = self.render();
        async {
            tokio::fs::write(&temp_path, content).await?;
            tokio::fs::rename(&temp_path, &self.path).await
        }
        .await
        .map_err(|source| journal_error(&self.path, source))
    }

    pub fn render(&self) -> String {
        let mut content = self.header.clone();
        for record in &self.records {
            content.push_str(&record.to_string());
            content.push('\n');
        }
        content
    }
}

/// Per-episode identifiers and stream urls.
pub struct EnumerationLog {
    path: PathBuf,
}

impl EnumerationLog {
    pub async fn create(dir: &Path) -> BangumiResult<Self> {
        let path = dir.join(ENUMERATION_FILE_NAME);
        tokio::fs::write(&path, ENUMERATION_BANNER).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(
        &self,
        index: usize,
        episode: &Episode,
        audio_url: &str,
        video_url: &str,
    ) -> BangumiResult<()> {
        // share url as sent by the server, empty when absent
        let entry = format!(
            "{ENUMERATION_BANNER}\
             # i: {index}\n\
             # aid: {}\n\
             # cid: {}\n\
             # refurl: {}\n\n\
             # aurl: {audio_url}\n\
             # vurl: {video_url}\n\n\n",
            episode.aid,
            episode.cid,
            episode.share_url.as_deref().unwrap_or_default(),
        );

        append_line(&self.path, &entry).await?;
        Ok(())
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

fn journal_error(path: &Path, source: std::io::Error) -> BangumiError {
    BangumiError::JournalError {
        path: path.to_path_buf(),
        source,
    }
}
