//! ID3v2.4 tag for MPEG audio streams.
//!
//! MPEG frames never reference absolute offsets, so a tag can be put in front
//! of the first frame (or replace a leading tag) without touching the audio.

use crate::{error::InjectError, format::AudioFormat, inject::TrackTags};

const HEADER_LEN: usize = 10;
const FLAG_FOOTER: u8 = 0x10;
const ENCODING_UTF8: u8 = 0x03;

/// Encodes `value` as a 28-bit synchsafe integer.
fn synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

fn read_synchsafe(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, b| (acc << 7) | (*b & 0x7F) as u32)
}

fn text_frame(out: &mut Vec<u8>, id: &[u8; 4], values: &[&str]) {
    let mut payload = vec![ENCODING_UTF8];
    // ID3v2.4 separates multiple text values with a NUL.
    payload.extend_from_slice(values.join("\0").as_bytes());

    out.extend_from_slice(id);
    out.extend_from_slice(&synchsafe(payload.len() as u32));
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&payload);
}

/// Builds a complete ID3v2.4 tag for `tags`.
pub(crate) fn build_tag(tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
    let mut frames = Vec::new();
    if !tags.title.is_empty() {
        text_frame(&mut frames, b"TIT2", &[&tags.title]);
    }
    let artists: Vec<&str> = tags
        .artists
        .iter()
        .map(String::as_str)
        .filter(|a| !a.is_empty())
        .collect();
    if !artists.is_empty() {
        text_frame(&mut frames, b"TPE1", &artists);
    }
    if !tags.album.is_empty() {
        text_frame(&mut frames, b"TALB", &[&tags.album]);
    }
    if tags.duration_ms > 0 {
        text_frame(&mut frames, b"TLEN", &[&tags.duration_ms.to_string()]);
    }

    if frames.len() >= 1 << 28 {
        return Err(InjectError::TooLarge {
            format: AudioFormat::Mp3,
            reason: format!("{} bytes of frames", frames.len()),
        });
    }

    let mut tag = Vec::with_capacity(HEADER_LEN + frames.len());
    tag.extend_from_slice(b"ID3");
    tag.extend_from_slice(&[4, 0, 0]);
    tag.extend_from_slice(&synchsafe(frames.len() as u32));
    tag.extend_from_slice(&frames);
    Ok(tag)
}

/// Total size of the ID3v2 tag at the start of `window`, header and footer included.
pub(crate) fn existing_tag_len(window: &[u8]) -> Option<usize> {
    if window.len() < HEADER_LEN || !window.starts_with(b"ID3") {
        return None;
    }
    let mut len = HEADER_LEN + read_synchsafe(&window[6..10]) as usize;
    if window[5] & FLAG_FOOTER != 0 {
        len += HEADER_LEN;
    }
    Some(len)
}

/// Puts a fresh tag in front of the MPEG stream starting `window`.
///
/// A leading tag is replaced; it must lie entirely inside the window.
pub(crate) fn inject(window: &[u8], tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
    let audio_start = match existing_tag_len(window) {
        Some(len) if len > window.len() => {
            return Err(InjectError::Incomplete {
                format: AudioFormat::Mp3,
                available: window.len(),
            });
        }
        Some(len) => len,
        None => 0,
    };

    let mut out = build_tag(tags)?;
    out.extend_from_slice(&window[audio_start..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> TrackTags {
        TrackTags {
            title: "Título".to_string(),
            artists: vec!["One".to_string(), "Two".to_string()],
            album: "LP".to_string(),
            duration_ms: 1_000,
        }
    }

    #[test]
    fn test_synchsafe_roundtrip() {
        assert_eq!(synchsafe(0x0FFF_FFFF), [0x7F, 0x7F, 0x7F, 0x7F]);
        assert_eq!(synchsafe(257), [0, 0, 2, 1]);
        assert_eq!(read_synchsafe(&synchsafe(123_456)), 123_456);
    }

    #[test]
    fn test_tag_layout() {
        let tag = build_tag(&tags()).unwrap();
        assert_eq!(&tag[..5], b"ID3\x04\x00");
        assert_eq!(existing_tag_len(&tag), Some(tag.len()));

        let tpe1 = tag.windows(4).position(|w| w == b"TPE1").unwrap();
        let size = read_synchsafe(&tag[tpe1 + 4..tpe1 + 8]) as usize;
        let payload = &tag[tpe1 + 10..tpe1 + 10 + size];
        assert_eq!(payload, b"\x03One\x00Two");
    }

    #[test]
    fn test_prepend_to_raw_frames() {
        let window = [0xFF, 0xFB, 0x90, 0x64, 1, 2, 3];
        let out = inject(&window, &tags()).unwrap();
        let tag_len = existing_tag_len(&out).unwrap();
        assert_eq!(&out[tag_len..], &window);
    }

    #[test]
    fn test_replace_existing_tag() {
        let old = build_tag(&TrackTags {
            title: "Old".to_string(),
            ..Default::default()
        })
        .unwrap();
        let mut window = old.clone();
        window.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);

        let out = inject(&window, &tags()).unwrap();
        assert!(!out.windows(3).any(|w| w == b"Old"));
        assert!(out.ends_with(&[0xFF, 0xFB, 0x90, 0x64]));
    }

    #[test]
    fn test_tag_larger_than_window() {
        let mut window = b"ID3\x04\x00\x00".to_vec();
        window.extend_from_slice(&synchsafe(10_000));
        window.resize(4096, 0);
        let err = inject(&window, &tags()).unwrap_err();
        assert!(matches!(err, InjectError::Incomplete { .. }));
    }
}
