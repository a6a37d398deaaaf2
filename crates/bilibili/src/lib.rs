//! Metadata of bilibili bangumi seasons and their play urls.

pub mod link;
pub mod model;

use std::time::Duration;

use bangumi::{BangumiError, BangumiResult, Episode, MetadataSource, PlayInfo};
use reqwest::{
    header::{COOKIE, REFERER},
    Client,
};
use serde::de::DeserializeOwned;
use url::Url;

pub use link::BangumiLink;
pub use model::{Media, Season};

pub const API_BASE_URL: &str = "https://api.bilibili.com/";
pub const DEFAULT_REFERER: &str = "https://www.bilibili.com";
/// Request every stream kind the web player knows about (dash, hdr, 4k, dolby, av1).
pub const DEFAULT_FNVAL: u32 = 4048;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BiliClient {
    client: Client,
    base_url: Url,
    referer: String,
    cookie: Option<String>,
}

impl BiliClient {
    pub fn new(user_agent: &str) -> BangumiResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(API_BASE_URL)?,
            referer: DEFAULT_REFERER.to_string(),
            cookie: None,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> BangumiResult<Self> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        self.base_url = base_url;
        Ok(self)
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    /// Logged-in cookie, required for member-only episodes and high qualities.
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = normalize_cookie(cookie);
        self
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub async fn season_by_ep_id(&self, ep_id: u64) -> BangumiResult<Season> {
        self.get("pgc/view/web/season", &[("ep_id", ep_id.to_string())])
            .await
    }

    pub async fn season_by_season_id(&self, season_id: u64) -> BangumiResult<Season> {
        self.get("pgc/view/web/season", &[("season_id", season_id.to_string())])
            .await
    }

    pub async fn media_info(&self, media_id: u64) -> BangumiResult<Media> {
        let result: model::MediaResult = self
            .get("pgc/review/user", &[("media_id", media_id.to_string())])
            .await?;
        Ok(result.media)
    }

    /// Resolve a bangumi page url to the season it belongs to.
    pub async fn season_from_url(&self, url: &str) -> BangumiResult<Season> {
        match url.parse::<BangumiLink>()? {
            BangumiLink::Media(media_id) => {
                tracing::info!("media_id = {media_id}");
                let media = self.media_info(media_id).await?;
                self.season_by_season_id(media.season_id).await
            }
            BangumiLink::Season(season_id) => {
                tracing::info!("season_id = {season_id}");
                self.season_by_season_id(season_id).await
            }
            BangumiLink::Episode(ep_id) => {
                tracing::info!("ep_id = {ep_id}");
                self.season_by_ep_id(ep_id).await
            }
        }
    }

    pub async fn play_url(&self, aid: u64, cid: u64, quality: u32) -> BangumiResult<PlayInfo> {
        self.get(
            "pgc/player/web/playurl",
            &[
                ("aid", aid.to_string()),
                ("cid", cid.to_string()),
                ("qn", quality.to_string()),
                ("fnval", DEFAULT_FNVAL.to_string()),
            ],
        )
        .await
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> BangumiResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        tracing::debug!("GET {url} {query:?}");

        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(REFERER, &self.referer);
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BangumiError::HttpError(status));
        }

        let body = response.text().await?;
        let envelope: model::Envelope<T> = serde_json::from_str(&body)?;
        envelope.into_result()
    }
}

impl MetadataSource for BiliClient {
    async fn play_info(&self, episode: &Episode, quality: u32) -> BangumiResult<PlayInfo> {
        self.play_url(episode.aid, episode.cid, quality).await
    }
}

/// Keep the `key=value` pairs of a cookie string, joined by `"; "`.
///
/// Returns `None` when nothing usable is left.
pub fn normalize_cookie(cookie: &str) -> Option<String> {
    let pairs: Vec<String> = cookie
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(format!("{key}={}", value.trim()))
        })
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
