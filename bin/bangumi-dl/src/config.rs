use std::path::{Path, PathBuf};

use anyhow::Context;
use bangumi::fetch::{BackendKind, DEFAULT_MAX_RETRY};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_NAME: &str = "bili-downloader";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub download: DownloadSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub default_quality: u32,
    /// `axel` or `aria2`
    pub default_downloader: String,
    pub default_threads: u32,
    pub cleanup_after_merge: bool,
    pub max_retry: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_quality: bangumi::DEFAULT_QUALITY,
            default_downloader: BackendKind::default().to_string(),
            default_threads: bangumi::pipeline::DEFAULT_CONNECTIONS,
            cleanup_after_merge: false,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// A generated Chrome user agent is used when unset.
    pub user_agent: Option<String>,
    pub referer: String,
    /// Extra request headers, e.g. `"Accept-Language: zh-CN"`.
    pub headers: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            referer: bangumi::pipeline::DEFAULT_REFERER.to_string(),
            headers: Vec::new(),
        }
    }
}

impl NetworkSettings {
    /// Parsed `headers`. Lines without a colon are ignored.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|header| {
                let (key, value) = header.split_once(':')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load `explicit` if given, it must exist. Otherwise the default path
    /// is read when present.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                tracing::debug!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = toml::from_str(&data)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }
}
