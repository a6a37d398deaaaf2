//! Quality and codec negotiation.
//!
//! The server advertises a list of [FormatDescriptor]s and, separately, the
//! elementary streams it actually serves. The two lists are not guaranteed
//! to agree, so a selection can legitimately end up without a video stream.

use crate::model::{FormatDescriptor, PlayInfo, StreamVariant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub format: FormatDescriptor,
    /// `None` when no video stream matches the selected quality and codec.
    pub video: Option<StreamVariant>,
    /// Highest bitrate audio stream, `None` only if the server sent no audio.
    pub audio: Option<StreamVariant>,
}

/// Picks the format for `requested_quality`, falling back to the best quality
/// offered, and the matching elementary streams.
///
/// Returns `None` when `formats` is empty, which means the episode has no
/// playable representation.
pub fn select(
    formats: &[FormatDescriptor],
    requested_quality: u32,
    audios: &[StreamVariant],
    videos: &[StreamVariant],
) -> Option<Selection> {
    let format = match formats.iter().find(|f| f.quality == requested_quality) {
        Some(format) => {
            tracing::debug!(quality = format.quality, "Found matching format");
            format
        }
        None => {
            let best = formats.iter().max_by_key(|f| f.quality)?;
            tracing::warn!(
                requested = requested_quality,
                selected = best.quality,
                "No matching format found, selecting the best available quality"
            );
            best
        }
    };

    let preferred_codec = format.preferred_codec();
    tracing::info!(
        quality = format.quality,
        codec = preferred_codec.unwrap_or("<none>"),
        "Selected format"
    );

    let video = videos
        .iter()
        .find(|v| v.id == format.quality && Some(v.codecs.as_str()) == preferred_codec)
        .cloned();
    let audio = audios.iter().max_by_key(|a| a.id).cloned();

    Some(Selection {
        format: format.clone(),
        video,
        audio,
    })
}

impl PlayInfo {
    pub fn select(&self, requested_quality: u32) -> Option<Selection> {
        select(
            &self.support_formats,
            requested_quality,
            &self.dash.audio,
            &self.dash.video,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(quality: u32, codecs: &[&str]) -> FormatDescriptor {
        FormatDescriptor {
            quality,
            codecs: codecs.iter().map(|c| c.to_string()).collect(),
            new_description: format!("{quality}P"),
            display_desc: String::new(),
            format: "flv".to_string(),
        }
    }

    fn stream(id: u32, codecs: &str) -> StreamVariant {
        StreamVariant {
            id,
            codecs: codecs.to_string(),
            base_url: format!("https://upos.example/{id}/{codecs}.m4s"),
        }
    }

    #[test]
    fn test_exact_quality() {
        let formats = [format(32, &["avc"]), format(80, &["hev"]), format(64, &["avc"])];
        for requested in [32, 64, 80] {
            let selection = select(&formats, requested, &[], &[]).unwrap();
            assert_eq!(selection.format.quality, requested);
        }
    }

    #[test]
    fn test_fallback_to_best_quality() {
        let formats = [format(32, &["avc"]), format(80, &["hev"]), format(64, &["avc"])];
        for requested in [0, 16, 74, 112, 127] {
            let selection = select(&formats, requested, &[], &[]).unwrap();
            assert_eq!(selection.format.quality, 80);
        }
    }

    #[test]
    fn test_fallback_video_match() {
        let formats = [format(32, &["avc"]), format(80, &["hev"])];
        let videos = [stream(32, "avc"), stream(80, "avc"), stream(80, "hev")];

        let selection = select(&formats, 112, &[], &videos).unwrap();
        assert_eq!(selection.format.quality, 80);
        assert_eq!(selection.video, Some(stream(80, "hev")));
    }

    #[test]
    fn test_video_absent() {
        let formats = [format(32, &["avc"]), format(80, &["hev"])];
        let videos = [stream(32, "avc"), stream(80, "avc")];

        let selection = select(&formats, 112, &[], &videos).unwrap();
        assert_eq!(selection.format.quality, 80);
        assert_eq!(selection.video, None);
    }

    #[test]
    fn test_format_without_codecs() {
        let formats = [format(80, &[])];
        let videos = [stream(80, "")];

        let selection = select(&formats, 80, &[], &videos).unwrap();
        assert_eq!(selection.video, None);
    }

    #[test]
    fn test_audio_is_independent() {
        let formats = [format(32, &["avc"]), format(80, &["hev"])];
        let audios = [stream(30216, "mp4a"), stream(30280, "mp4a"), stream(30232, "mp4a")];
        let videos = [stream(32, "avc"), stream(80, "hev")];

        for requested in [32, 80, 112] {
            let selection = select(&formats, requested, &audios, &videos).unwrap();
            assert_eq!(selection.audio.unwrap().id, 30280);
        }
    }

    #[test]
    fn test_no_formats() {
        assert_eq!(select(&[], 80, &[stream(30280, "mp4a")], &[]), None);
    }
}
