//! Container classification from the leading bytes of a stream.
//!
//! [`classify`] never reads past the slice it is given; callers decide how
//! many bytes to fetch (the configured chunk size) and may call it again on
//! a wider window.

use crate::format::AudioFormat;

/// Classifies the container of `window`.
///
/// Rules, in priority order: `OggS` at offset 0, `fLaC` at offset 0, an
/// `ID3` tag or a valid MPEG audio frame (after optional zero padding), and
/// finally an MP4 `ftyp` box. Anything else is [`AudioFormat::Unknown`].
pub fn classify(window: &[u8]) -> AudioFormat {
    if window.starts_with(b"OggS") {
        return AudioFormat::OggVorbis;
    }
    if window.starts_with(b"fLaC") {
        return AudioFormat::Flac;
    }
    if is_mp3(window) {
        return AudioFormat::Mp3;
    }
    if let Some(format) = detect_mp4(window) {
        return format;
    }
    AudioFormat::Unknown
}

fn is_mp3(window: &[u8]) -> bool {
    if window.starts_with(b"ID3") {
        return true;
    }
    let Some(start) = window.iter().position(|b| *b != 0) else {
        return false;
    };
    let Some(frame_len) = mpeg_frame_len(&window[start..]) else {
        return false;
    };
    // Confirm with the next header when the window holds it.
    let next = start + frame_len;
    if window.len() >= next + 4 {
        return mpeg_frame_len(&window[next..]).is_some();
    }
    true
}

const BITRATES_V1_L1: [u32; 16] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
];
const BITRATES_V1_L2: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
];
const BITRATES_V1_L3: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const BITRATES_V2_L1: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
];
const BITRATES_V2_L23: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

/// Returns the length in bytes of the MPEG audio frame whose header starts
/// `bytes`, or `None` if the header is not a valid one.
pub(crate) fn mpeg_frame_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
        return None;
    }
    // 0 = MPEG 2.5, 1 = reserved, 2 = MPEG 2, 3 = MPEG 1
    let version = (bytes[1] >> 3) & 0x03;
    // 0 = reserved, 1 = layer III, 2 = layer II, 3 = layer I
    let layer = (bytes[1] >> 1) & 0x03;
    let bitrate_index = (bytes[2] >> 4) as usize;
    let sample_rate_index = ((bytes[2] >> 2) & 0x03) as usize;
    let padding = ((bytes[2] >> 1) & 0x01) as u32;

    if version == 1 || layer == 0 || bitrate_index == 0 || bitrate_index == 15 {
        return None;
    }
    if sample_rate_index == 3 {
        return None;
    }

    let bitrate_kbps = match (version, layer) {
        (3, 3) => BITRATES_V1_L1[bitrate_index],
        (3, 2) => BITRATES_V1_L2[bitrate_index],
        (3, 1) => BITRATES_V1_L3[bitrate_index],
        (_, 3) => BITRATES_V2_L1[bitrate_index],
        _ => BITRATES_V2_L23[bitrate_index],
    };
    let sample_rate = match version {
        3 => [44100, 48000, 32000][sample_rate_index],
        2 => [22050, 24000, 16000][sample_rate_index],
        _ => [11025, 12000, 8000][sample_rate_index],
    };

    let bitrate = bitrate_kbps * 1000;
    let len = match layer {
        3 => (12 * bitrate / sample_rate + padding) * 4,
        1 if version != 3 => 72 * bitrate / sample_rate + padding,
        _ => 144 * bitrate / sample_rate + padding,
    };
    Some(len as usize)
}

fn detect_mp4(window: &[u8]) -> Option<AudioFormat> {
    if window.len() < 8 || &window[4..8] != b"ftyp" {
        return None;
    }
    if window.windows(4).any(|w| w == b"alac") {
        Some(AudioFormat::Alac)
    } else {
        Some(AudioFormat::Aac)
    }
}
