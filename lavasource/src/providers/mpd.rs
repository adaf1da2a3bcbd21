//! Manifestes DASH de Tidal
//!
//! Tidal sert une partie des flux (notamment `HI_RES`) sous forme de MPD à
//! gabarit de segments : un segment d'initialisation puis des segments
//! numérotés (`$Number$`) décrits par une `SegmentTimeline`. Les segments
//! sont lus dans l'ordre et concaténés dans une seule session.

use crate::error::{Result, StreamError};
use crate::fetch::MediaFetcher;
use crate::session::ByteStream;
use futures::{StreamExt, TryStreamExt};
use lavamedia::AudioFormat;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;
use tracing::debug;

/// Description d'un flux segmenté
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashManifest {
    pub mime_type: String,
    pub codecs: String,
    pub initialization: String,
    pub media: String,
    /// Numéros des segments média, dans l'ordre de lecture
    pub segments: Vec<u64>,
}

impl DashManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut saw_mpd = false;
        let mut in_audio = false;
        let mut done = false;
        let mut mime_type = None;
        let mut codecs = None;
        let mut initialization = None;
        let mut media = None;
        let mut next_number = 1u64;
        let mut segments = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| StreamError::upstream(format!("invalid DASH manifest: {}", e)))?;
            let (element, closes) = match event {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    if in_audio && e.local_name().as_ref() == b"AdaptationSet" {
                        in_audio = false;
                        done = true;
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };
            if done {
                continue;
            }

            match element.local_name().as_ref() {
                b"MPD" => saw_mpd = true,
                b"AdaptationSet" => {
                    let content = attribute(&element, b"contentType")?;
                    let mime = attribute(&element, b"mimeType")?;
                    let audio = content.as_deref() == Some("audio")
                        || mime.as_deref().is_some_and(|m| m.starts_with("audio/"));
                    if audio {
                        in_audio = !closes;
                        mime_type = mime;
                        if let Some(c) = attribute(&element, b"codecs")? {
                            codecs = Some(c);
                        }
                    }
                }
                b"Representation" if in_audio => {
                    if codecs.is_none() {
                        codecs = attribute(&element, b"codecs")?;
                    }
                    if mime_type.is_none() {
                        mime_type = attribute(&element, b"mimeType")?;
                    }
                }
                b"SegmentTemplate" if in_audio && media.is_none() => {
                    initialization = attribute(&element, b"initialization")?;
                    media = attribute(&element, b"media")?;
                    if let Some(start) = attribute(&element, b"startNumber")? {
                        next_number = parse_number(&start, "startNumber")?;
                    }
                }
                b"S" if in_audio => {
                    // `r` compte les répétitions après le premier segment
                    let repeat = match attribute(&element, b"r")? {
                        Some(r) => parse_number(&r, "r")?,
                        None => 0,
                    };
                    for _ in 0..=repeat {
                        segments.push(next_number);
                        next_number += 1;
                    }
                }
                _ => {}
            }
        }

        if !saw_mpd {
            return Err(StreamError::upstream("DASH manifest has no MPD element"));
        }
        let initialization = initialization
            .ok_or_else(|| StreamError::upstream("DASH manifest has no initialization segment"))?;
        let media =
            media.ok_or_else(|| StreamError::upstream("DASH manifest has no media template"))?;
        if !media.contains("$Number$") {
            return Err(StreamError::unsupported_format(format!(
                "DASH media template without $Number$: {}",
                media
            )));
        }

        let manifest = Self {
            mime_type: mime_type.unwrap_or_else(|| "audio/mp4".to_string()),
            codecs: codecs.unwrap_or_default(),
            initialization,
            media,
            segments,
        };
        debug!(
            mime_type = %manifest.mime_type,
            codecs = %manifest.codecs,
            segments = manifest.segments.len(),
            "DASH manifest parsed"
        );
        Ok(manifest)
    }

    /// Conteneur des segments ; FLAC et ALAC y sont encapsulés en MP4
    pub fn format(&self) -> AudioFormat {
        let codecs = self.codecs.to_ascii_lowercase();
        match self.mime_type.as_str() {
            "audio/mp4" | "audio/m4a" if codecs.contains("alac") => AudioFormat::Alac,
            "audio/mp4" | "audio/m4a" => AudioFormat::Aac,
            "audio/flac" => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        }
    }

    /// URLs à lire : initialisation puis segments média
    pub fn segment_urls(&self) -> Vec<String> {
        std::iter::once(self.initialization.clone())
            .chain(
                self.segments
                    .iter()
                    .map(|n| self.media.replace("$Number$", &n.to_string())),
            )
            .collect()
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = unescape(&raw)
                .map_err(|e| StreamError::upstream(format!("invalid DASH attribute: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_number(value: &str, name: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| StreamError::upstream(format!("invalid DASH {} {:?}", name, value)))
}

/// Lit les segments restants l'un après l'autre, à la demande
pub fn chain_segments(fetcher: Arc<dyn MediaFetcher>, urls: Vec<String>) -> ByteStream {
    futures::stream::iter(urls)
        .then(move |url| {
            let fetcher = fetcher.clone();
            async move {
                debug!(url = %url, "fetching DASH segment");
                fetcher.fetch(&url).await.map(|media| media.stream)
            }
        })
        .try_flatten()
        .boxed()
}
