use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

/// One unit of content to acquire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Episode {
    pub aid: u64,
    pub cid: u64,

    /// Share-style title, e.g. `《Title》第1话`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub share_copy: Option<String>,
    /// Canonical share url, only used as a referer hint.
    #[serde(default, deserialize_with = "null_as_default")]
    pub share_url: Option<String>,
}

impl Episode {
    pub fn new(aid: u64, cid: u64) -> Self {
        Self {
            aid,
            cid,
            share_copy: None,
            share_url: None,
        }
    }

    pub fn with_share_copy(mut self, share_copy: impl Into<String>) -> Self {
        self.share_copy = Some(share_copy.into());
        self
    }

    pub fn with_share_url(mut self, share_url: impl Into<String>) -> Self {
        self.share_url = Some(share_url.into());
        self
    }
}

/// A quality / codec pairing advertised by the server for an episode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormatDescriptor {
    pub quality: u32,
    /// Ordered codec identifiers, the first one is preferred.
    #[serde(default, deserialize_with = "null_as_default")]
    pub codecs: Vec<String>,
    #[serde(default)]
    pub new_description: String,
    #[serde(default)]
    pub display_desc: String,
    /// Container hint, used as the video file extension.
    #[serde(default)]
    pub format: String,
}

impl FormatDescriptor {
    pub fn preferred_codec(&self) -> Option<&str> {
        self.codecs.first().map(String::as_str)
    }

    /// Extension of the downloaded video elementary stream.
    pub fn extension(&self) -> &str {
        if self.format.is_empty() {
            "m4s"
        } else {
            &self.format
        }
    }
}

/// One concrete elementary stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamVariant {
    pub id: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub codecs: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DashInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub audio: Vec<StreamVariant>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub video: Vec<StreamVariant>,
}

/// Answer of a play-url query for one episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlayInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub support_formats: Vec<FormatDescriptor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dash: DashInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A single file transfer handed to a [StreamFetcher](crate::fetch::StreamFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub dest: PathBuf,
    pub connections: u32,
    /// Ordered `(name, value)` pairs.
    pub headers: Vec<(String, String)>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            connections: 1,
            headers: Vec::new(),
        }
    }

    pub fn connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value: String = value.into();
        let value: String = value.chars().filter(|c| !c.is_control()).collect();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get_header("User-Agent")
    }

    pub fn referer(&self) -> Option<&str> {
        self.get_header("Referer")
    }

    /// Headers other than `User-Agent` and `Referer`.
    pub fn extra_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(key, _)| {
                !key.eq_ignore_ascii_case("User-Agent") && !key.eq_ignore_ascii_case("Referer")
            })
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn dest_dir(&self) -> &Path {
        self.dest.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
