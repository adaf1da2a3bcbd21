//! # Ogg/Vorbis comment rewriting
//!
//! A Vorbis stream starts with three header packets: identification (alone
//! on the first page), comment and setup. The setup packet always finishes
//! a page, so the audio data starts on a fresh page.
//!
//! The injector rebuilds the comment packet and lays the comment and setup
//! packets back over exactly as many pages as they originally used. Page
//! sequence numbers are reused, so every page after the headers is relayed
//! byte for byte and still forms a valid stream.

use crate::{
    error::InjectError,
    format::AudioFormat,
    inject::TrackTags,
    vorbis_comment::VorbisComment,
};

const HEADER_LEN: usize = 27;
const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;
const MAX_SEGMENTS: usize = 255;

const IDENT_MAGIC: &[u8] = b"\x01vorbis";
const COMMENT_MAGIC: &[u8] = b"\x03vorbis";
const SETUP_MAGIC: &[u8] = b"\x05vorbis";

/// Granule position of a page on which no packet finishes.
const NO_GRANULE: u64 = u64::MAX;

pub(crate) mod crc {
    //! Ogg CRC32: polynomial 0x04c11db7, initial value 0, no final XOR.

    const fn get_tbl_elem(idx: u32) -> u32 {
        let mut r: u32 = idx << 24;
        let mut i = 0;
        while i < 8 {
            r = (r << 1) ^ (-(((r >> 31) & 1) as i32) as u32 & 0x04c11db7);
            i += 1;
        }
        r
    }

    const fn lookup_array() -> [u32; 0x100] {
        let mut lup_arr: [u32; 0x100] = [0; 0x100];
        let mut i = 0;
        while i < 0x100 {
            lup_arr[i] = get_tbl_elem(i as u32);
            i += 1;
        }
        lup_arr
    }

    static CRC_LOOKUP_ARRAY: &[u32] = &lookup_array();

    pub fn vorbis_crc32_update(cur: u32, array: &[u8]) -> u32 {
        let mut ret: u32 = cur;
        for av in array {
            ret = (ret << 8) ^ CRC_LOOKUP_ARRAY[(*av as u32 ^ (ret >> 24)) as usize];
        }
        ret
    }

    /// Checksum of a complete page whose CRC field (bytes 22..26) is zero.
    pub fn page_checksum(page: &[u8]) -> u32 {
        vorbis_crc32_update(0, page)
    }
}

/// A page borrowed from the window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Page<'a> {
    pub flags: u8,
    pub granule: u64,
    pub serial: u32,
    pub sequence: u32,
    pub lacing: &'a [u8],
    pub body: &'a [u8],
    /// Total page length, header included.
    pub len: usize,
}

fn malformed(reason: impl Into<String>) -> InjectError {
    InjectError::Malformed {
        format: AudioFormat::OggVorbis,
        reason: reason.into(),
    }
}

/// Parses the page starting at `buf[0]`; `Ok(None)` when `buf` ends inside it.
pub(crate) fn parse_page(buf: &[u8]) -> Result<Option<Page<'_>>, InjectError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if &buf[..4] != b"OggS" {
        return Err(malformed("missing OggS capture pattern"));
    }
    if buf[4] != 0 {
        return Err(malformed(format!("unsupported page version {}", buf[4])));
    }
    let segments = buf[26] as usize;
    let body_start = HEADER_LEN + segments;
    if buf.len() < body_start {
        return Ok(None);
    }
    let lacing = &buf[HEADER_LEN..body_start];
    let body_len: usize = lacing.iter().map(|l| *l as usize).sum();
    if buf.len() < body_start + body_len {
        return Ok(None);
    }

    Ok(Some(Page {
        flags: buf[5],
        granule: u64::from_le_bytes(buf[6..14].try_into().unwrap_or_default()),
        serial: u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]),
        sequence: u32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]),
        lacing,
        body: &buf[body_start..body_start + body_len],
        len: body_start + body_len,
    }))
}

/// Appends a page to `out` and fills in its checksum.
pub(crate) fn write_page(
    out: &mut Vec<u8>,
    flags: u8,
    granule: u64,
    serial: u32,
    sequence: u32,
    lacing: &[u8],
    body: &[u8],
) {
    let start = out.len();
    out.extend_from_slice(b"OggS");
    out.push(0);
    out.push(flags);
    out.extend_from_slice(&granule.to_le_bytes());
    out.extend_from_slice(&serial.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.push(lacing.len() as u8);
    out.extend_from_slice(lacing);
    out.extend_from_slice(body);

    let checksum = crc::page_checksum(&out[start..]);
    out[start + 22..start + 26].copy_from_slice(&checksum.to_le_bytes());
}

/// Lacing values of a single packet of `len` bytes.
fn lacing_for(len: usize) -> Vec<u8> {
    let mut lacing = vec![255u8; len / 255];
    lacing.push((len % 255) as u8);
    lacing
}

struct HeaderLayout<'a> {
    pages: Vec<Page<'a>>,
    packets: Vec<Vec<u8>>,
    /// Bytes of the window covered by the header pages.
    end: usize,
}

fn read_headers(window: &[u8]) -> Result<HeaderLayout<'_>, InjectError> {
    let mut pages: Vec<Page<'_>> = Vec::new();
    let mut packets: Vec<Vec<u8>> = Vec::with_capacity(3);
    let mut current = Vec::new();
    let mut offset = 0;

    while packets.len() < 3 {
        let page = parse_page(&window[offset..])?.ok_or(InjectError::Incomplete {
            format: AudioFormat::OggVorbis,
            available: window.len(),
        })?;

        match pages.first() {
            None if page.flags & FLAG_BOS == 0 => {
                return Err(malformed("first page is not a beginning of stream"));
            }
            Some(first) if first.serial != page.serial => {
                return Err(InjectError::Unsupported {
                    format: AudioFormat::OggVorbis,
                    reason: "multiplexed streams".to_string(),
                });
            }
            _ => {}
        }

        let mut pos = 0;
        for (i, lace) in page.lacing.iter().enumerate() {
            let lace = *lace as usize;
            current.extend_from_slice(&page.body[pos..pos + lace]);
            pos += lace;
            if lace < 255 {
                packets.push(std::mem::take(&mut current));
                if packets.len() == 1 && i + 1 != page.lacing.len() {
                    return Err(malformed("identification packet does not fill its page"));
                }
                if packets.len() == 3 && i + 1 != page.lacing.len() {
                    return Err(InjectError::Unsupported {
                        format: AudioFormat::OggVorbis,
                        reason: "audio data shares the setup header page".to_string(),
                    });
                }
            }
        }

        offset += page.len;
        pages.push(page);
    }

    if !packets[0].starts_with(IDENT_MAGIC) {
        return Err(InjectError::Unsupported {
            format: AudioFormat::OggVorbis,
            reason: "not a Vorbis bitstream".to_string(),
        });
    }
    if !packets[1].starts_with(COMMENT_MAGIC) {
        return Err(malformed("second header packet is not a comment header"));
    }
    if !packets[2].starts_with(SETUP_MAGIC) {
        return Err(malformed("third header packet is not a setup header"));
    }

    Ok(HeaderLayout {
        pages,
        packets,
        end: offset,
    })
}

/// Rewrites the comment header of the Vorbis stream starting `window`.
///
/// Returns the new window: the identification page, the re-laid comment and
/// setup pages, then the rest of `window` untouched.
pub(crate) fn inject(window: &[u8], tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
    let layout = read_headers(window)?;

    let mut comment = VorbisComment::parse(&layout.packets[1][COMMENT_MAGIC.len()..])
        .ok_or_else(|| malformed("truncated comment header"))?;
    comment.apply(tags);

    let mut comment_packet = COMMENT_MAGIC.to_vec();
    comment_packet.extend_from_slice(&comment.to_bytes());
    comment_packet.push(0x01);

    let setup = &layout.packets[2];
    let mut segments = lacing_for(comment_packet.len());
    segments.extend(lacing_for(setup.len()));
    let mut payload = comment_packet;
    payload.extend_from_slice(setup);

    let header_pages = &layout.pages[1..];
    let page_count = header_pages.len();
    if segments.len() < page_count || segments.len() > page_count * MAX_SEGMENTS {
        return Err(InjectError::TooLarge {
            format: AudioFormat::OggVorbis,
            reason: format!(
                "{} lacing segments cannot be spread over {} pages",
                segments.len(),
                page_count
            ),
        });
    }

    let first = &layout.pages[0];
    let mut out = Vec::with_capacity(window.len() + payload.len());
    out.extend_from_slice(&window[..first.len]);

    let mut seg_pos = 0;
    let mut body_pos = 0;
    for (idx, original) in header_pages.iter().enumerate() {
        let pages_after = page_count - idx - 1;
        let take = (segments.len() - seg_pos - pages_after).min(MAX_SEGMENTS);
        let lacing = &segments[seg_pos..seg_pos + take];
        let body_len: usize = lacing.iter().map(|l| *l as usize).sum();

        let mut flags = original.flags & FLAG_EOS;
        if seg_pos > 0 && segments[seg_pos - 1] == 255 {
            flags |= FLAG_CONTINUED;
        }
        let granule = if lacing.iter().any(|l| *l < 255) {
            0
        } else {
            NO_GRANULE
        };

        write_page(
            &mut out,
            flags,
            granule,
            original.serial,
            original.sequence,
            lacing,
            &payload[body_pos..body_pos + body_len],
        );
        seg_pos += take;
        body_pos += body_len;
    }

    out.extend_from_slice(&window[layout.end..]);
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a Vorbis stream: identification page, one page holding the
    /// comment and setup packets, then `audio_pages` audio pages.
    pub(crate) fn sample_stream(comment_entries: &[&str], audio_pages: usize) -> Vec<u8> {
        let serial = 0x1234_5678;
        let mut ident = IDENT_MAGIC.to_vec();
        ident.resize(30, 0x11);

        let mut comment = COMMENT_MAGIC.to_vec();
        comment.extend_from_slice(
            &VorbisComment {
                vendor: "libVorbis test".to_string(),
                entries: comment_entries.iter().map(|e| e.to_string()).collect(),
            }
            .to_bytes(),
        );
        comment.push(0x01);

        let mut setup = SETUP_MAGIC.to_vec();
        setup.resize(600, 0x22);

        let mut out = Vec::new();
        write_page(&mut out, FLAG_BOS, 0, serial, 0, &lacing_for(ident.len()), &ident);

        let mut lacing = lacing_for(comment.len());
        lacing.extend(lacing_for(setup.len()));
        let mut body = comment;
        body.extend_from_slice(&setup);

        let mut sequence = 1;
        let mut body_pos = 0;
        for (n, chunk) in lacing.chunks(MAX_SEGMENTS).enumerate() {
            let continued = n > 0 && lacing[n * MAX_SEGMENTS - 1] == 255;
            let len: usize = chunk.iter().map(|l| *l as usize).sum();
            let granule = if chunk.iter().any(|l| *l < 255) { 0 } else { NO_GRANULE };
            write_page(
                &mut out,
                if continued { FLAG_CONTINUED } else { 0 },
                granule,
                serial,
                sequence,
                chunk,
                &body[body_pos..body_pos + len],
            );
            sequence += 1;
            body_pos += len;
        }

        for page in 0..audio_pages {
            let audio = vec![page as u8; 100];
            write_page(
                &mut out,
                0,
                (page as u64 + 1) * 1024,
                serial,
                sequence,
                &lacing_for(audio.len()),
                &audio,
            );
            sequence += 1;
        }
        out
    }

    fn pages(buf: &[u8]) -> Vec<Page<'_>> {
        let mut offset = 0;
        let mut pages = Vec::new();
        while let Some(page) = parse_page(&buf[offset..]).unwrap() {
            offset += page.len;
            pages.push(page);
            if offset == buf.len() {
                break;
            }
        }
        pages
    }

    fn tags() -> TrackTags {
        TrackTags {
            title: "Song".to_string(),
            artists: vec!["First".to_string(), "Second".to_string()],
            album: "Record".to_string(),
            duration_ms: 183_500,
        }
    }

    #[test]
    fn test_crc_matches_reference_value() {
        // CRC of the ASCII digits with the Ogg polynomial.
        assert_eq!(crc::vorbis_crc32_update(0, b"123456789"), 0x89A1_897F);
    }

    #[test]
    fn test_injected_headers_keep_page_structure() {
        let source = sample_stream(&["TITLE=Wrong", "ENCODER=test"], 3);
        let injected = inject(&source, &tags()).unwrap();

        let before = pages(&source);
        let after = pages(&injected);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.sequence, b.sequence);
            assert_eq!(a.serial, b.serial);
        }

        let layout = read_headers(&injected).unwrap();
        let comment = VorbisComment::parse(&layout.packets[1][COMMENT_MAGIC.len()..]).unwrap();
        assert_eq!(comment.vendor, "libVorbis test");
        assert!(comment.entries.contains(&"ENCODER=test".to_string()));
        assert!(comment.entries.contains(&"TITLE=Song".to_string()));
        assert!(!comment.entries.contains(&"TITLE=Wrong".to_string()));
        assert!(comment.entries.contains(&"ARTIST=Second".to_string()));
        assert!(comment.entries.contains(&"LENGTH=183500".to_string()));
    }

    #[test]
    fn test_audio_pages_are_untouched() {
        let source = sample_stream(&[], 4);
        let injected = inject(&source, &tags()).unwrap();

        let source_layout = read_headers(&source).unwrap();
        let injected_layout = read_headers(&injected).unwrap();
        assert_eq!(
            &source[source_layout.end..],
            &injected[injected_layout.end..]
        );
        assert_eq!(
            injected.len() - source.len(),
            injected_layout.end - source_layout.end
        );
    }

    #[test]
    fn test_checksums_are_valid() {
        let injected = inject(&sample_stream(&[], 1), &tags()).unwrap();
        let mut offset = 0;
        while offset < injected.len() {
            let page = parse_page(&injected[offset..]).unwrap().unwrap();
            let mut copy = injected[offset..offset + page.len].to_vec();
            let stored = u32::from_le_bytes(copy[22..26].try_into().unwrap());
            copy[22..26].copy_from_slice(&[0; 4]);
            assert_eq!(crc::page_checksum(&copy), stored);
            offset += page.len;
        }
    }

    #[test]
    fn test_truncated_headers_report_incomplete() {
        let source = sample_stream(&[], 1);
        let err = inject(&source[..200], &tags()).unwrap_err();
        assert!(matches!(err, InjectError::Incomplete { .. }));
    }

    #[test]
    fn test_comment_spanning_pages_is_laid_back_over_same_count() {
        let long = format!("DESCRIPTION={}", "x".repeat(70_000));
        let source = sample_stream(&[long.as_str()], 1);
        assert_eq!(pages(&source).len(), 4);

        let injected = inject(&source, &tags()).unwrap();
        let after = pages(&injected);
        assert_eq!(after.len(), 4);
        assert_eq!(after[2].flags & FLAG_CONTINUED, FLAG_CONTINUED);
        assert_eq!(after[1].granule, NO_GRANULE);
        assert_eq!(after[2].granule, 0);
    }

    #[test]
    fn test_oversized_comment_is_rejected() {
        let source = sample_stream(&[], 1);
        let huge = TrackTags {
            title: "t".repeat(70_000),
            ..tags()
        };
        let err = inject(&source, &huge).unwrap_err();
        assert!(matches!(err, InjectError::TooLarge { .. }));
    }
}
