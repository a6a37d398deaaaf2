pub mod error;
pub mod fetch;
pub mod journal;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod select;
pub mod source;
pub mod util;

pub use error::{BangumiError, BangumiResult};
pub use model::{DownloadTarget, Episode, FormatDescriptor, PlayInfo, StreamVariant};
pub use pipeline::{AcquisitionPipeline, EpisodeOutcome, PipelineOptions, RunReport};
pub use source::MetadataSource;

pub const DEFAULT_QUALITY: u32 = 112;
