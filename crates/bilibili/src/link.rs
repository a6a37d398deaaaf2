use std::{str::FromStr, sync::LazyLock};

use bangumi::{BangumiError, BangumiResult};
use regex::Regex;
use url::Url;

static MEDIA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/bangumi/media/md(\d+)").unwrap());
static SEASON_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/bangumi/play/ss(\d+)").unwrap());
static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// What a bangumi page url points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BangumiLink {
    /// `https://www.bilibili.com/bangumi/media/md28234679`
    Media(u64),
    /// `https://www.bilibili.com/bangumi/play/ss33415`
    Season(u64),
    /// `https://www.bilibili.com/bangumi/play/ep327584`
    Episode(u64),
}

impl FromStr for BangumiLink {
    type Err = BangumiError;

    fn from_str(s: &str) -> BangumiResult<Self> {
        let url = Url::parse(s.trim().trim_end_matches('/'))
            .map_err(|_| BangumiError::InvalidUrl(s.to_string()))?;
        if url.host_str().is_none() {
            return Err(BangumiError::InvalidUrl(s.to_string()));
        }
        let path = url.path();

        let parse = |digits: &str| {
            digits
                .parse::<u64>()
                .map_err(|_| BangumiError::InvalidUrl(s.to_string()))
        };

        if let Some(captures) = MEDIA_REGEX.captures(path) {
            return Ok(Self::Media(parse(&captures[1])?));
        }
        if let Some(captures) = SEASON_REGEX.captures(path) {
            return Ok(Self::Season(parse(&captures[1])?));
        }
        match NUMBER_REGEX.find(path) {
            Some(digits) => Ok(Self::Episode(parse(digits.as_str())?)),
            None => Err(BangumiError::InvalidUrl(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_links() {
        assert_eq!(
            "https://www.bilibili.com/bangumi/media/md28234679/".parse::<BangumiLink>().unwrap(),
            BangumiLink::Media(28234679)
        );
        assert_eq!(
            "https://www.bilibili.com/bangumi/play/ss33415".parse::<BangumiLink>().unwrap(),
            BangumiLink::Season(33415)
        );
        assert_eq!(
            "https://www.bilibili.com/bangumi/play/ep327584?from_spmid=666.25".parse::<BangumiLink>().unwrap(),
            BangumiLink::Episode(327584)
        );
        assert_eq!(
            "https://m.bilibili.com/bangumi/play/ep1231".parse::<BangumiLink>().unwrap(),
            BangumiLink::Episode(1231)
        );
    }

    #[test]
    fn test_parse_invalid_links() {
        assert!(matches!(
            "https://www.bilibili.com/bangumi/play/".parse::<BangumiLink>(),
            Err(BangumiError::InvalidUrl(_))
        ));
        assert!(matches!(
            "ep327584".parse::<BangumiLink>(),
            Err(BangumiError::InvalidUrl(_))
        ));
    }
}
