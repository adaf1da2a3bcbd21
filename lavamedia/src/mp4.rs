//! iTunes-style tagging of fully buffered MP4/M4A files.
//!
//! The tags live in `moov/udta/meta/ilst`. Growing `moov` moves every byte
//! behind it, so the chunk offset tables (`stco`, `co64`) are patched for
//! each offset that pointed past the original `moov`.

use crate::{error::InjectError, format::AudioFormat, inject::TrackTags};

const ITEM_TITLE: &[u8; 4] = b"\xa9nam";
const ITEM_ARTIST: &[u8; 4] = b"\xa9ART";
const ITEM_ALBUM: &[u8; 4] = b"\xa9alb";
const DATA_TYPE_UTF8: u32 = 1;

/// Boxes whose payload is a plain list of child boxes and that may lead to a
/// chunk offset table.
const OFFSET_CONTAINERS: [&[u8; 4]; 5] = [b"moov", b"trak", b"mdia", b"minf", b"stbl"];

#[derive(Debug, Clone, Copy)]
struct BoxRef {
    kind: [u8; 4],
    start: usize,
    header: usize,
    end: usize,
}

impl BoxRef {
    fn payload(&self) -> std::ops::Range<usize> {
        self.start + self.header..self.end
    }
}

struct Mp4<'a> {
    format: AudioFormat,
    data: &'a [u8],
}

impl<'a> Mp4<'a> {
    fn malformed(&self, reason: impl Into<String>) -> InjectError {
        InjectError::Malformed {
            format: self.format,
            reason: reason.into(),
        }
    }

    fn unsupported(&self, reason: impl Into<String>) -> InjectError {
        InjectError::Unsupported {
            format: self.format,
            reason: reason.into(),
        }
    }

    fn u32_at(&self, pos: usize) -> Result<u32, InjectError> {
        self.data
            .get(pos..pos + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| self.malformed("unexpected end of data"))
    }

    fn u64_at(&self, pos: usize) -> Result<u64, InjectError> {
        Ok(((self.u32_at(pos)? as u64) << 32) | self.u32_at(pos + 4)? as u64)
    }

    /// Lists the boxes laid out in `data[from..to]`.
    fn children(&self, from: usize, to: usize) -> Result<Vec<BoxRef>, InjectError> {
        let mut boxes = Vec::new();
        let mut pos = from;
        while pos + 8 <= to {
            let size32 = self.u32_at(pos)? as usize;
            let mut kind = [0u8; 4];
            kind.copy_from_slice(&self.data[pos + 4..pos + 8]);
            let (header, size) = match size32 {
                0 => (8, to - pos),
                1 => {
                    let large = self.u64_at(pos + 8)?;
                    let size = usize::try_from(large).map_err(|_| {
                        self.malformed(format!("box size {} does not fit in memory", large))
                    })?;
                    (16, size)
                }
                n => (8, n),
            };
            if size < header || size > to - pos {
                return Err(self.malformed(format!(
                    "box {} overflows its parent",
                    String::from_utf8_lossy(&kind)
                )));
            }
            boxes.push(BoxRef {
                kind,
                start: pos,
                header,
                end: pos + size,
            });
            pos += size;
        }
        Ok(boxes)
    }

    fn find(boxes: &[BoxRef], kind: &[u8; 4]) -> Option<BoxRef> {
        boxes.iter().copied().find(|b| &b.kind == kind)
    }

    fn bytes(&self, b: &BoxRef) -> &'a [u8] {
        &self.data[b.start..b.end]
    }

    /// Rejects fragments whose track fragment header carries absolute offsets.
    fn check_fragments(&self, top: &[BoxRef]) -> Result<(), InjectError> {
        for moof in top.iter().filter(|b| &b.kind == b"moof") {
            let payload = moof.payload();
            for traf in self
                .children(payload.start, payload.end)?
                .iter()
                .filter(|b| &b.kind == b"traf")
            {
                let range = traf.payload();
                if let Some(tfhd) = Self::find(&self.children(range.start, range.end)?, b"tfhd") {
                    let flags = self.u32_at(tfhd.start + tfhd.header)? & 0x00FF_FFFF;
                    if flags & 0x01 != 0 {
                        return Err(self.unsupported("fragment with explicit base data offset"));
                    }
                }
            }
        }
        Ok(())
    }

    fn build_udta(&self, old: Option<BoxRef>, tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
        let mut payload = Vec::new();
        let mut old_meta = None;
        if let Some(udta) = old {
            let range = udta.payload();
            for child in self.children(range.start, range.end)? {
                if &child.kind == b"meta" {
                    old_meta = Some(child);
                } else {
                    payload.extend_from_slice(self.bytes(&child));
                }
            }
        }
        payload.extend_from_slice(&self.build_meta(old_meta, tags)?);
        Ok(make_box(b"udta", &payload))
    }

    fn build_meta(&self, old: Option<BoxRef>, tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
        let mut kept_items = Vec::new();
        let mut others = Vec::new();
        if let Some(meta) = old {
            // meta is a full box: version and flags precede the children.
            let range = meta.payload();
            for child in self.children(range.start + 4, range.end)? {
                match &child.kind {
                    b"hdlr" => {}
                    b"ilst" => {
                        let items = child.payload();
                        for item in self.children(items.start, items.end)? {
                            if ![ITEM_TITLE, ITEM_ARTIST, ITEM_ALBUM].contains(&&item.kind) {
                                kept_items.extend_from_slice(self.bytes(&item));
                            }
                        }
                    }
                    _ => others.extend_from_slice(self.bytes(&child)),
                }
            }
        }

        let mut ilst = kept_items;
        if !tags.title.is_empty() {
            ilst.extend(text_item(ITEM_TITLE, &tags.title));
        }
        let artists = tags
            .artists
            .iter()
            .filter(|a| !a.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if !artists.is_empty() {
            ilst.extend(text_item(ITEM_ARTIST, &artists));
        }
        if !tags.album.is_empty() {
            ilst.extend(text_item(ITEM_ALBUM, &tags.album));
        }

        let mut payload = vec![0u8; 4];
        payload.extend(hdlr_box());
        payload.extend(make_box(b"ilst", &ilst));
        payload.extend_from_slice(&others);
        Ok(make_box(b"meta", &payload))
    }
}

fn make_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn hdlr_box() -> Vec<u8> {
    let mut payload = vec![0u8; 4]; // version + flags
    payload.extend_from_slice(&[0; 4]); // pre_defined
    payload.extend_from_slice(b"mdir");
    payload.extend_from_slice(b"appl");
    payload.extend_from_slice(&[0; 8]);
    payload.push(0); // empty name
    make_box(b"hdlr", &payload)
}

fn text_item(kind: &[u8; 4], value: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + value.len());
    data.extend_from_slice(&DATA_TYPE_UTF8.to_be_bytes());
    data.extend_from_slice(&[0; 4]); // locale
    data.extend_from_slice(value.as_bytes());
    make_box(kind, &make_box(b"data", &data))
}

/// Adds `delta` to every chunk offset of `moov` that is at or past `threshold`.
fn shift_chunk_offsets(
    moov: &mut [u8],
    format: AudioFormat,
    threshold: u64,
    delta: i64,
) -> Result<(), InjectError> {
    let mut pending = vec![(0usize, moov.len())];
    while let Some((from, to)) = pending.pop() {
        let view = Mp4 { format, data: &*moov };
        let boxes = view.children(from, to)?;
        drop(view);

        for b in boxes {
            let payload = b.payload();
            if OFFSET_CONTAINERS.contains(&&b.kind) {
                pending.push((payload.start, payload.end));
                continue;
            }
            let wide = match &b.kind {
                b"stco" => false,
                b"co64" => true,
                _ => continue,
            };
            let entry_len = if wide { 8 } else { 4 };
            let count_pos = payload.start + 4;
            let count = Mp4 { format, data: &*moov }.u32_at(count_pos)? as usize;
            let first = count_pos + 4;
            if first + count * entry_len > payload.end {
                return Err(InjectError::Malformed {
                    format,
                    reason: "chunk offset table overflows its box".to_string(),
                });
            }
            for i in 0..count {
                let pos = first + i * entry_len;
                let value = moov[pos..pos + entry_len]
                    .iter()
                    .fold(0u64, |acc, b| (acc << 8) | *b as u64);
                if value < threshold {
                    continue;
                }
                let shifted = value.checked_add_signed(delta).ok_or(InjectError::TooLarge {
                    format,
                    reason: "chunk offset out of range".to_string(),
                })?;
                let entry = &mut moov[pos..pos + entry_len];
                if wide {
                    entry.copy_from_slice(&shifted.to_be_bytes());
                } else {
                    let narrow = u32::try_from(shifted).map_err(|_| InjectError::TooLarge {
                        format,
                        reason: "chunk offset no longer fits in stco".to_string(),
                    })?;
                    entry.copy_from_slice(&narrow.to_be_bytes());
                }
            }
        }
    }
    Ok(())
}

/// Rewrites the iTunes tags of a complete MP4 file.
pub(crate) fn inject(
    data: &[u8],
    format: AudioFormat,
    tags: &TrackTags,
) -> Result<Vec<u8>, InjectError> {
    let file = Mp4 { format, data };
    let top = file.children(0, data.len())?;
    if top.first().map(|b| &b.kind) != Some(b"ftyp") {
        return Err(file.malformed("file does not start with ftyp"));
    }
    let moov = Mp4::find(&top, b"moov").ok_or_else(|| file.malformed("no moov box"))?;
    file.check_fragments(&top)?;

    let range = moov.payload();
    let mut payload = Vec::with_capacity(moov.end - moov.start);
    let mut old_udta = None;
    for child in file.children(range.start, range.end)? {
        if &child.kind == b"udta" {
            old_udta = Some(child);
        } else {
            payload.extend_from_slice(file.bytes(&child));
        }
    }
    payload.extend(file.build_udta(old_udta, tags)?);

    if 8 + payload.len() > u32::MAX as usize {
        return Err(InjectError::TooLarge {
            format,
            reason: "moov box exceeds 4 GiB".to_string(),
        });
    }
    let mut new_moov = make_box(b"moov", &payload);
    let delta = new_moov.len() as i64 - (moov.end - moov.start) as i64;
    shift_chunk_offsets(&mut new_moov, format, moov.end as u64, delta)?;

    let mut out = Vec::with_capacity((data.len() as i64 + delta).max(0) as usize);
    out.extend_from_slice(&data[..moov.start]);
    out.extend_from_slice(&new_moov);
    out.extend_from_slice(&data[moov.end..]);
    Ok(out)
}
