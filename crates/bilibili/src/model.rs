use bangumi::{BangumiError, BangumiResult, Episode};
use serde::{Deserialize, Deserializer};

/// Common wrapper of every pgc api response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default, alias = "msg")]
    pub message: String,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> BangumiResult<T> {
        if self.code != 0 {
            return Err(BangumiError::Api {
                code: self.code,
                message: self.message,
            });
        }

        self.result
            .ok_or_else(|| BangumiError::UnexpectedResponse("missing result".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Season {
    pub season_id: u64,
    #[serde(default)]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub season_id: u64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaResult {
    pub media: Media,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
