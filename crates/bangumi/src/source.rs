use std::future::Future;

use crate::{
    error::BangumiResult,
    model::{Episode, PlayInfo},
};

/// Where episode formats and stream urls come from.
pub trait MetadataSource {
    fn play_info(
        &self,
        episode: &Episode,
        quality: u32,
    ) -> impl Future<Output = BangumiResult<PlayInfo>> + Send;
}

