//! Vorbis comment structure, shared by Ogg/Vorbis comment packets and FLAC
//! `VORBIS_COMMENT` metadata blocks.

use crate::inject::TrackTags;

pub(crate) const DEFAULT_VENDOR: &str = "Spotilava";

/// Keys owned by the injector; any existing value is replaced.
const MANAGED_KEYS: [&str; 4] = ["TITLE", "ARTIST", "ALBUM", "LENGTH"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VorbisComment {
    pub vendor: String,
    pub entries: Vec<String>,
}

impl VorbisComment {
    pub fn empty() -> Self {
        Self {
            vendor: DEFAULT_VENDOR.to_string(),
            entries: Vec::new(),
        }
    }

    /// Parses the little-endian, length-prefixed layout (without the
    /// `\x03vorbis` packet prefix and without the framing bit).
    pub fn parse(body: &[u8]) -> Option<Self> {
        let mut cursor = Cursor { buf: body, pos: 0 };
        let vendor = cursor.string()?;
        let count = cursor.u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            entries.push(cursor.string()?);
        }
        Some(Self { vendor, entries })
    }

    /// Replaces the managed keys with the values of `tags`, keeping every other entry.
    pub fn apply(&mut self, tags: &TrackTags) {
        self.entries.retain(|entry| {
            let key = entry.split('=').next().unwrap_or_default();
            !MANAGED_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
        });
        if !tags.title.is_empty() {
            self.entries.push(format!("TITLE={}", tags.title));
        }
        for artist in tags.artists.iter().filter(|a| !a.is_empty()) {
            self.entries.push(format!("ARTIST={}", artist));
        }
        if !tags.album.is_empty() {
            self.entries.push(format!("ALBUM={}", tags.album));
        }
        if tags.duration_ms > 0 {
            self.entries.push(format!("LENGTH={}", tags.duration_ms));
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, &self.vendor);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            put_string(&mut out, entry);
        }
        out
    }
}

fn put_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Option<String> {
        let len = self.u32()? as usize;
        let bytes = self.buf.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_managed_keys_only() {
        let mut comment = VorbisComment {
            vendor: "Xiph.Org libVorbis I 20120203 (Omnipresent)".to_string(),
            entries: vec![
                "title=Old".to_string(),
                "COMMENT=keep me".to_string(),
                "Artist=Old Artist".to_string(),
            ],
        };
        let tags = TrackTags {
            title: "New".to_string(),
            artists: vec!["A".to_string(), "B".to_string()],
            album: "Album".to_string(),
            duration_ms: 215_000,
        };
        comment.apply(&tags);

        assert_eq!(
            comment.entries,
            vec![
                "COMMENT=keep me",
                "TITLE=New",
                "ARTIST=A",
                "ARTIST=B",
                "ALBUM=Album",
                "LENGTH=215000",
            ]
        );

        let parsed = VorbisComment::parse(&comment.to_bytes()).unwrap();
        assert_eq!(parsed, comment);
    }

    #[test]
    fn test_parse_rejects_truncated_body() {
        let comment = VorbisComment::empty();
        let mut bytes = comment.to_bytes();
        bytes[4 + DEFAULT_VENDOR.len()] = 3;
        assert!(VorbisComment::parse(&bytes).is_none());
    }
}
