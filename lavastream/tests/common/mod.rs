//! Fournisseurs simulés partagés par les tests d'intégration

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use lavasource::{
    Album, Artist, Authenticator, ByteStream, CtrKey, FetchedMedia, MediaFetcher, PlaybackMode,
    Playlist, Result, SpotifyApi, SpotifyAudioFile, SpotifyCredential, SpotifyEpisodeInfo,
    SpotifyTrackInfo, StreamError, TidalApi, TidalPlaybackInfo, TidalSession, TidalTrackInfo,
    TrackSummary,
};
use ogg::{PacketWriteEndInfo, PacketWriter};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SERIAL: u32 = 0x2A2A_0001;

// ============ Contenus ============

/// Flux Vorbis minimal : identification seule sur la première page,
/// commentaire et setup sur la deuxième, puis une page par paquet audio
pub fn vorbis_stream(audio_packets: usize) -> Vec<u8> {
    let mut writer = PacketWriter::new(Vec::new());

    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.push(2);
    ident.extend_from_slice(&44_100u32.to_le_bytes());
    ident.extend_from_slice(&[0; 12]);
    ident.push(0xB8);
    ident.push(1);
    writer
        .write_packet(ident, SERIAL, PacketWriteEndInfo::EndPage, 0)
        .unwrap();

    let vendor = "Xiph.Org libVorbis I 20200704";
    let mut comment = b"\x03vorbis".to_vec();
    comment.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    comment.extend_from_slice(vendor.as_bytes());
    comment.extend_from_slice(&0u32.to_le_bytes());
    comment.push(1);
    writer
        .write_packet(comment, SERIAL, PacketWriteEndInfo::NormalPacket, 0)
        .unwrap();

    let mut setup = b"\x05vorbis".to_vec();
    setup.resize(1200, 0x37);
    writer
        .write_packet(setup, SERIAL, PacketWriteEndInfo::EndPage, 0)
        .unwrap();

    for n in 0..audio_packets {
        let info = if n + 1 == audio_packets {
            PacketWriteEndInfo::EndStream
        } else {
            PacketWriteEndInfo::EndPage
        };
        writer
            .write_packet(vec![n as u8; 800], SERIAL, info, (n as u64 + 1) * 1024)
            .unwrap();
    }
    writer.into_inner()
}

/// Offset de la page `index` d'un flux Ogg
pub fn page_offset(data: &[u8], index: usize) -> usize {
    let mut pos = 0;
    for _ in 0..index {
        let segments = data[pos + 26] as usize;
        let body: usize = data[pos + 27..pos + 27 + segments]
            .iter()
            .map(|l| *l as usize)
            .sum();
        pos += 27 + segments + body;
    }
    pos
}

/// Trames MPEG-1 layer III à 128 kbit/s et 44,1 kHz
pub fn mp3_frames(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 417);
    for n in 0..count {
        out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        out.extend(std::iter::repeat_n(n as u8 | 1, 413));
    }
    out
}

pub fn chunked(data: Vec<u8>, size: usize) -> ByteStream {
    let chunks: Vec<Result<Bytes>> = data
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks).boxed()
}

// ============ Spotify ============

/// Source sans fin ; compte les lectures et signale sa fermeture
#[derive(Clone, Default)]
pub struct EndlessSource {
    pub reads: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

struct CloseGuard(Arc<AtomicBool>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl EndlessSource {
    pub fn stream(&self) -> ByteStream {
        let guard = CloseGuard(self.closed.clone());
        let reads = self.reads.clone();
        futures::stream::unfold((guard, reads), |(guard, reads)| async move {
            reads.fetch_add(1, Ordering::SeqCst);
            let chunk = Bytes::from(mp3_frames(4));
            Some((Ok(chunk), (guard, reads)))
        })
        .boxed()
    }
}

pub enum SpotifyBody {
    Bytes(Vec<u8>),
    Endless(EndlessSource),
}

pub const ALBUM_ID: &str = "6N9PS4QXF1D0OWPk0Sxtb4";

/// Spotify en mémoire ; `album` regroupe tous les morceaux connus
pub struct FakeSpotify {
    pub tracks: HashMap<String, (&'static str, SpotifyBody)>,
    pub episodes: HashSet<String>,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            episodes: HashSet::new(),
        }
    }

    pub fn with_track(mut self, id: &str, format: &'static str, body: SpotifyBody) -> Self {
        self.tracks.insert(id.to_string(), (format, body));
        self
    }

    pub fn with_episode(mut self, id: &str, format: &'static str, body: SpotifyBody) -> Self {
        self.episodes.insert(id.to_string());
        self.with_track(id, format, body)
    }

    fn lookup(&self, id: &str, episode: bool) -> Result<&'static str> {
        match self.tracks.get(id) {
            Some((format, _)) if self.episodes.contains(id) == episode => Ok(*format),
            _ => Err(StreamError::not_found(format!("no item {}", id))),
        }
    }
}

#[async_trait]
impl Authenticator for FakeSpotify {
    type Credential = SpotifyCredential;

    async fn authenticate(&self) -> Result<SpotifyCredential> {
        Ok(SpotifyCredential {
            username: "listener".to_string(),
            access_token: "token".to_string(),
        })
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn track(&self, _c: &SpotifyCredential, id: &str) -> Result<SpotifyTrackInfo> {
        let format = self.lookup(id, false)?;
        Ok(SpotifyTrackInfo {
            id: id.to_string(),
            name: "Never Gonna Give You Up".to_string(),
            artists: vec!["Rick Astley".to_string()],
            album: "Whenever You Need Somebody".to_string(),
            duration_ms: 213_573,
            files: vec![SpotifyAudioFile {
                file_id: format!("{}-file", id),
                format: format.to_string(),
            }],
        })
    }

    async fn open_audio(
        &self,
        _c: &SpotifyCredential,
        track_id: &str,
        _file_id: &str,
    ) -> Result<FetchedMedia> {
        let (_, body) = self
            .tracks
            .get(track_id)
            .ok_or_else(|| StreamError::not_found("no audio"))?;
        let media = match body {
            SpotifyBody::Bytes(data) => FetchedMedia {
                stream: chunked(data.clone(), 1000),
                content_length: Some(data.len() as u64),
            },
            SpotifyBody::Endless(source) => FetchedMedia {
                stream: source.stream(),
                content_length: None,
            },
        };
        Ok(media)
    }

    async fn album(&self, _c: &SpotifyCredential, id: &str) -> Result<Album> {
        if id != ALBUM_ID {
            return Err(StreamError::not_found(format!("no album {}", id)));
        }
        let mut ids: Vec<&String> = self
            .tracks
            .keys()
            .filter(|id| !self.episodes.contains(*id))
            .collect();
        ids.sort();
        Ok(Album {
            id: id.to_string(),
            name: "Whenever You Need Somebody".to_string(),
            image: Some("https://i.scdn.co/image/cover".to_string()),
            artists: vec![Artist {
                id: "0gxyHStUsqpMadRV0Di1Qt".to_string(),
                name: "Rick Astley".to_string(),
                image: None,
            }],
            tracks: ids
                .into_iter()
                .map(|id| TrackSummary {
                    id: id.clone(),
                    title: "Never Gonna Give You Up".to_string(),
                    album: "Whenever You Need Somebody".to_string(),
                    image: None,
                    artists: vec!["Rick Astley".to_string()],
                    duration: 213_573,
                })
                .collect(),
        })
    }

    async fn playlist(&self, _c: &SpotifyCredential, id: &str) -> Result<Playlist> {
        Err(StreamError::not_found(format!("no playlist {}", id)))
    }

    async fn episode(&self, _c: &SpotifyCredential, id: &str) -> Result<SpotifyEpisodeInfo> {
        let format = self.lookup(id, true)?;
        Ok(SpotifyEpisodeInfo {
            id: id.to_string(),
            name: "Episode 1".to_string(),
            description: "Pilot".to_string(),
            show: "The Show".to_string(),
            publisher: "Studio".to_string(),
            image: None,
            duration_ms: 1_800_000,
            files: vec![SpotifyAudioFile {
                file_id: format!("{}-file", id),
                format: format.to_string(),
            }],
        })
    }

    async fn country(&self, _c: &SpotifyCredential) -> Result<String> {
        Ok("SE".to_string())
    }
}

// ============ Tidal ============

pub const TIDAL_URL: &str = "https://tidal.test/master.flac";

/// Tidal dont le mode OFFLINE échoue toujours
pub struct FakeTidal {
    pub modes: Mutex<Vec<PlaybackMode>>,
    /// `mimeType` et `codecs` du manifeste BTS
    pub media: (&'static str, &'static str),
}

impl FakeTidal {
    pub fn flac() -> Self {
        Self {
            modes: Mutex::new(Vec::new()),
            media: ("audio/flac", "flac"),
        }
    }

    pub fn m4a() -> Self {
        Self {
            modes: Mutex::new(Vec::new()),
            media: ("audio/mp4", "mp4a.40.2"),
        }
    }
}

#[async_trait]
impl Authenticator for FakeTidal {
    type Credential = TidalSession;

    async fn authenticate(&self) -> Result<TidalSession> {
        Ok(TidalSession {
            access_token: "token".to_string(),
            country_code: "FR".to_string(),
        })
    }
}

#[async_trait]
impl TidalApi for FakeTidal {
    async fn track(&self, _s: &TidalSession, id: &str) -> Result<TidalTrackInfo> {
        Ok(TidalTrackInfo {
            id: id.to_string(),
            title: "Master".to_string(),
            artists: vec!["Orchestra".to_string()],
            album: "Symphonies".to_string(),
            duration_secs: 600,
            audio_quality: "HI_RES".to_string(),
        })
    }

    async fn playback_info(
        &self,
        _s: &TidalSession,
        _id: &str,
        quality: &str,
        mode: PlaybackMode,
    ) -> Result<TidalPlaybackInfo> {
        self.modes.lock().unwrap().push(mode);
        if mode == PlaybackMode::Offline {
            return Err(StreamError::from_status_code(500, "offline unavailable"));
        }
        let (mime, codecs) = self.media;
        let manifest = format!(
            r#"{{"mimeType":"{}","codecs":"{}","encryptionType":"NONE","urls":["{}"]}}"#,
            mime, codecs, TIDAL_URL
        );
        Ok(TidalPlaybackInfo {
            audio_quality: quality.to_string(),
            manifest_mime_type: "application/vnd.tidal.bts".to_string(),
            manifest: base64::engine::general_purpose::STANDARD.encode(manifest),
        })
    }

    fn unwrap_key(&self, _key_id: &str) -> Result<CtrKey> {
        Err(StreamError::decryption("no key expected"))
    }
}

/// Sert un corps fixe pour une URL
pub struct StaticFetcher {
    pub url: String,
    pub body: Vec<u8>,
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        if url != self.url {
            return Err(StreamError::from_status_code(404, url));
        }
        Ok(FetchedMedia {
            stream: chunked(self.body.clone(), 3000),
            content_length: Some(self.body.len() as u64),
        })
    }
}

/// FLAC minimal : STREAMINFO seul, puis des « trames »
pub fn flac_file(frames: usize) -> Vec<u8> {
    let mut data = b"fLaC".to_vec();
    data.push(0x80);
    data.extend_from_slice(&34u32.to_be_bytes()[1..]);
    data.extend_from_slice(&[0x11; 34]);
    for n in 0..frames {
        data.extend_from_slice(&[0xFF, 0xF8]);
        data.extend(std::iter::repeat_n(n as u8, 998));
    }
    data
}

/// Corps alimenté par le test, morceau par morceau
pub struct ChannelFetcher {
    pub url: String,
    pub receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes>>>>,
}

impl ChannelFetcher {
    pub fn new(url: &str) -> (Self, mpsc::UnboundedSender<Result<Bytes>>) {
        let (tx, rx) = mpsc::unbounded();
        let fetcher = Self {
            url: url.to_string(),
            receiver: Mutex::new(Some(rx)),
        };
        (fetcher, tx)
    }
}

#[async_trait]
impl MediaFetcher for ChannelFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        if url != self.url {
            return Err(StreamError::from_status_code(404, url));
        }
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StreamError::upstream("body already taken"))?;
        Ok(FetchedMedia {
            stream: receiver.boxed(),
            content_length: None,
        })
    }
}

/// M4A minimal : `ftyp`, `moov` vide puis `mdat`
pub fn m4a_file(mdat: &[u8]) -> Vec<u8> {
    let mut file = b"\x00\x00\x00\x14ftypM4A \x00\x00\x00\x00M4A ".to_vec();
    file.extend_from_slice(&[0, 0, 0, 20]);
    file.extend_from_slice(b"moov");
    file.extend_from_slice(&[0, 0, 0, 12]);
    file.extend_from_slice(b"mvhd");
    file.extend_from_slice(&[0; 4]);
    file.extend_from_slice(&((8 + mdat.len()) as u32).to_be_bytes());
    file.extend_from_slice(b"mdat");
    file.extend_from_slice(mdat);
    file
}
