//! Format dispatch for metadata injection.
//!
//! Streaming formats are tagged from a header window: the bytes returned
//! replace that window and everything after it is relayed unchanged. MP4
//! based formats keep their tags next to absolute chunk offsets, so they are
//! flagged and tagged once the whole file has been buffered.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::InjectError, flac, format::AudioFormat, id3, mp4, ogg};

/// Largest header window the pipeline should grow to when injection keeps
/// reporting [`InjectError::Incomplete`].
pub const MAX_HEADER_WINDOW: usize = 64 * 1024;

/// Tags written into the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
}

/// Result of [`inject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injected {
    /// Bytes to emit in place of the window.
    pub bytes: Vec<u8>,
    /// The window was left untouched; use [`inject_buffered`] on the whole file.
    pub requires_full_buffer: bool,
}

/// Rewrites the header `window` of a `format` stream with `tags`.
pub fn inject(
    window: &[u8],
    format: AudioFormat,
    tags: &TrackTags,
) -> Result<Injected, InjectError> {
    let bytes = match format {
        AudioFormat::OggVorbis => ogg::inject(window, tags)?,
        AudioFormat::Mp3 => id3::inject(window, tags)?,
        AudioFormat::Flac => flac::inject(window, tags)?,
        AudioFormat::Aac | AudioFormat::Alac => {
            debug!(%format, "deferring metadata injection until fully buffered");
            return Ok(Injected {
                bytes: window.to_vec(),
                requires_full_buffer: true,
            });
        }
        AudioFormat::Unknown => {
            return Err(InjectError::Unsupported {
                format,
                reason: "unrecognised container".to_string(),
            });
        }
    };
    debug!(%format, before = window.len(), after = bytes.len(), "metadata injected");
    Ok(Injected {
        bytes,
        requires_full_buffer: false,
    })
}

/// Tags a complete file. Only needed for formats flagged `requires_full_buffer`,
/// other formats go through [`inject`] on the whole input.
pub fn inject_buffered(
    data: &[u8],
    format: AudioFormat,
    tags: &TrackTags,
) -> Result<Vec<u8>, InjectError> {
    match format {
        AudioFormat::Aac | AudioFormat::Alac => mp4::inject(data, format, tags),
        _ => inject(data, format, tags).map(|injected| injected.bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = inject(b"garbage", AudioFormat::Unknown, &TrackTags::default()).unwrap_err();
        assert!(matches!(err, InjectError::Unsupported { .. }));
    }

    #[test]
    fn test_mp4_window_is_deferred() {
        let window = b"\x00\x00\x00\x18ftypM4A ".to_vec();
        let injected = inject(&window, AudioFormat::Aac, &TrackTags::default()).unwrap();
        assert!(injected.requires_full_buffer);
        assert_eq!(injected.bytes, window);
    }

    #[test]
    fn test_buffered_mp4_goes_through_box_rewriting() {
        let file = mp4::tests::sample_file(b"frames", true);
        let tags = TrackTags {
            title: "Song".to_string(),
            ..Default::default()
        };
        let out = inject_buffered(&file, AudioFormat::Alac, &tags).unwrap();
        assert!(out.len() > file.len());
        assert!(out.windows(4).any(|w| w == b"ilst"));
    }
}
