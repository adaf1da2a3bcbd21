//! FLAC `VORBIS_COMMENT` injection.
//!
//! A new comment block is inserted right after `STREAMINFO`. Comment blocks
//! already present in the window are turned into `PADDING` so that readers
//! only see one set of tags; their entries that the injector does not manage
//! are carried over into the new block.

use crate::{
    error::InjectError,
    format::AudioFormat,
    inject::TrackTags,
    vorbis_comment::VorbisComment,
};

const BLOCK_HEADER_LEN: usize = 4;
const LAST_BLOCK: u8 = 0x80;
const STREAMINFO: u8 = 0;
const PADDING: u8 = 1;
const VORBIS_COMMENT: u8 = 4;
const INVALID: u8 = 127;
const MAX_BLOCK_LEN: usize = (1 << 24) - 1;

#[derive(Debug, Clone, Copy)]
struct Block {
    offset: usize,
    kind: u8,
    len: usize,
    last: bool,
}

impl Block {
    fn end(&self) -> usize {
        self.offset + BLOCK_HEADER_LEN + self.len
    }
}

fn malformed(reason: &str) -> InjectError {
    InjectError::Malformed {
        format: AudioFormat::Flac,
        reason: reason.to_string(),
    }
}

fn incomplete(window: &[u8]) -> InjectError {
    InjectError::Incomplete {
        format: AudioFormat::Flac,
        available: window.len(),
    }
}

/// Metadata blocks whose header lies inside `window`.
fn visible_blocks(window: &[u8]) -> Result<Vec<Block>, InjectError> {
    let mut blocks = Vec::new();
    let mut pos = 4;
    while pos + BLOCK_HEADER_LEN <= window.len() {
        let header = window[pos];
        let kind = header & !LAST_BLOCK;
        if kind == INVALID {
            return Err(malformed("invalid metadata block type"));
        }
        let len = u32::from_be_bytes([0, window[pos + 1], window[pos + 2], window[pos + 3]]) as usize;
        let block = Block {
            offset: pos,
            kind,
            len,
            last: header & LAST_BLOCK != 0,
        };
        blocks.push(block);
        if block.last {
            break;
        }
        pos = block.end();
    }
    Ok(blocks)
}

pub(crate) fn inject(window: &[u8], tags: &TrackTags) -> Result<Vec<u8>, InjectError> {
    if !window.starts_with(b"fLaC") {
        return Err(malformed("missing fLaC marker"));
    }
    let blocks = visible_blocks(window)?;
    let streaminfo = *blocks.first().ok_or_else(|| incomplete(window))?;
    if streaminfo.kind != STREAMINFO {
        return Err(malformed("first metadata block is not STREAMINFO"));
    }
    if streaminfo.end() > window.len() {
        return Err(incomplete(window));
    }

    let mut rest = window.to_vec();
    let mut comment: Option<VorbisComment> = None;
    for block in blocks.iter().filter(|b| b.kind == VORBIS_COMMENT) {
        if block.end() > window.len() {
            return Err(incomplete(window));
        }
        let body = &window[block.offset + BLOCK_HEADER_LEN..block.end()];
        if comment.is_none() {
            comment = VorbisComment::parse(body);
        }
        rest[block.offset] = (rest[block.offset] & LAST_BLOCK) | PADDING;
        rest[block.offset + BLOCK_HEADER_LEN..block.end()].fill(0);
    }

    let mut comment = comment.unwrap_or_else(VorbisComment::empty);
    comment.apply(tags);
    let body = comment.to_bytes();
    if body.len() > MAX_BLOCK_LEN {
        return Err(InjectError::TooLarge {
            format: AudioFormat::Flac,
            reason: format!("comment block of {} bytes", body.len()),
        });
    }

    let split = streaminfo.end();
    let mut out = Vec::with_capacity(window.len() + BLOCK_HEADER_LEN + body.len());
    out.extend_from_slice(&rest[..split]);
    out[streaminfo.offset] &= !LAST_BLOCK;

    let header = if streaminfo.last {
        LAST_BLOCK | VORBIS_COMMENT
    } else {
        VORBIS_COMMENT
    };
    out.push(header);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&body);
    out.extend_from_slice(&rest[split..]);
    Ok(out)
}
