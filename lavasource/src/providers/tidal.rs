//! Tidal
//!
//! Les informations de lecture sont demandées en mode `OFFLINE` (meilleure
//! qualité) puis en mode `STREAM` si le premier échoue ou renvoie une
//! qualité dégradée, ou si le média `OFFLINE` ne peut pas être ouvert. Le
//! manifeste BTS donne l'URL du média et, pour les flux chiffrés,
//! l'identifiant de clé que le client externe convertit en clé AES-CTR. Les
//! manifestes DASH sont lus segment par segment (voir [`super::mpd`]).

use crate::adapter::{ProviderAdapter, check_alphanumeric, unknown_encoding};
use crate::catalog::{Album, CatalogItem, CatalogKind, Playlist};
use crate::credential::{Authenticator, ProviderCredential};
use crate::crypto::{CtrKey, decrypt_ctr};
use crate::error::{ErrorKind, Result, StreamError};
use crate::fetch::MediaFetcher;
use crate::models::{Encoding, Provider, QualityTier, Track};
use crate::providers::mpd::{DashManifest, chain_segments};
use crate::session::StreamSession;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use lavamedia::AudioFormat;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Qualités Tidal, de la plus faible à la plus élevée
const QUALITIES: [&str; 4] = ["LOW", "HIGH", "LOSSLESS", "HI_RES"];

#[derive(Debug, Clone)]
pub struct TidalSession {
    pub access_token: String,
    pub country_code: String,
}

#[derive(Debug, Clone)]
pub struct TidalTrackInfo {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_secs: u64,
    /// Meilleure qualité annoncée pour le morceau
    pub audio_quality: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Offline,
    Stream,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::Offline => "OFFLINE",
            PlaybackMode::Stream => "STREAM",
        }
    }
}

/// Réponse de `playbackinfopostpaywall`
#[derive(Debug, Clone)]
pub struct TidalPlaybackInfo {
    pub audio_quality: String,
    pub manifest_mime_type: String,
    /// Manifeste encodé en base64
    pub manifest: String,
}

/// Client Tidal externe
#[async_trait]
pub trait TidalApi: Authenticator<Credential = TidalSession> {
    async fn track(&self, session: &TidalSession, id: &str) -> Result<TidalTrackInfo>;

    async fn playback_info(
        &self,
        session: &TidalSession,
        id: &str,
        quality: &str,
        mode: PlaybackMode,
    ) -> Result<TidalPlaybackInfo>;

    /// Dérive la clé de flux depuis le `keyId` du manifeste
    fn unwrap_key(&self, key_id: &str) -> Result<CtrKey>;

    async fn album(&self, _session: &TidalSession, id: &str) -> Result<Album> {
        Err(StreamError::not_found(format!("album {}", id)))
    }

    /// `id` est l'UUID de la playlist
    async fn playlist(&self, _session: &TidalSession, id: &str) -> Result<Playlist> {
        Err(StreamError::not_found(format!("playlist {}", id)))
    }
}

/// Manifeste `application/vnd.tidal.bts`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtsManifest {
    pub mime_type: String,
    #[serde(default)]
    pub codecs: Option<String>,
    #[serde(default)]
    pub encryption_type: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    pub urls: Vec<String>,
}

impl BtsManifest {
    pub fn decode(info: &TidalPlaybackInfo) -> Result<Self> {
        let mime = info.manifest_mime_type.as_str();
        if !mime.contains("vnd.tidal.bts") {
            return Err(StreamError::upstream(format!("not a BTS manifest: {}", mime)));
        }
        let raw = decode_base64(&info.manifest)?;
        serde_json::from_slice(&raw)
            .map_err(|e| StreamError::upstream(format!("invalid BTS manifest: {}", e)))
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_type
            .as_deref()
            .is_some_and(|t| !t.eq_ignore_ascii_case("NONE"))
    }

    /// Format annoncé par le manifeste
    pub fn format(&self) -> AudioFormat {
        let codecs = self.codecs.as_deref().unwrap_or_default().to_ascii_lowercase();
        match self.mime_type.as_str() {
            "audio/flac" => AudioFormat::Flac,
            "audio/mp4" | "audio/m4a" if codecs.contains("alac") => AudioFormat::Alac,
            "audio/mp4" | "audio/m4a" => AudioFormat::Aac,
            _ => AudioFormat::Unknown,
        }
    }
}

fn decode_base64(manifest: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(manifest.trim())
        .map_err(|e| StreamError::upstream(format!("manifest is not base64: {}", e)))
}

/// Manifeste d'un morceau, selon son type MIME
#[derive(Debug, Clone)]
pub enum TidalManifest {
    Bts(BtsManifest),
    Dash(DashManifest),
}

impl TidalManifest {
    pub fn decode(info: &TidalPlaybackInfo) -> Result<Self> {
        let mime = info.manifest_mime_type.as_str();
        if mime.contains("dash+xml") {
            let raw = decode_base64(&info.manifest)?;
            let xml = String::from_utf8(raw)
                .map_err(|_| StreamError::upstream("DASH manifest is not UTF-8"))?;
            return DashManifest::parse(&xml).map(TidalManifest::Dash);
        }
        if mime.contains("vnd.tidal.bts") {
            return BtsManifest::decode(info).map(TidalManifest::Bts);
        }
        Err(StreamError::upstream(format!("unknown manifest type {}", mime)))
    }

    pub fn format(&self) -> AudioFormat {
        match self {
            TidalManifest::Bts(bts) => bts.format(),
            TidalManifest::Dash(dash) => dash.format(),
        }
    }
}

/// Format et palier d'une qualité Tidal
pub fn quality_encoding(quality: &str) -> Option<(AudioFormat, QualityTier)> {
    match quality {
        "LOW" => Some((AudioFormat::Aac, QualityTier::Low)),
        "HIGH" => Some((AudioFormat::Aac, QualityTier::High)),
        "LOSSLESS" => Some((AudioFormat::Flac, QualityTier::VeryHigh)),
        "HI_RES" | "HI_RES_LOSSLESS" => Some((AudioFormat::Flac, QualityTier::Master)),
        _ => None,
    }
}

fn tier(quality: &str) -> Option<QualityTier> {
    quality_encoding(quality).map(|(_, tier)| tier)
}

pub struct TidalAdapter {
    credential: Arc<ProviderCredential<dyn TidalApi>>,
    fetcher: Arc<dyn MediaFetcher>,
}

impl TidalAdapter {
    pub fn new(
        credential: Arc<ProviderCredential<dyn TidalApi>>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self { credential, fetcher }
    }

    pub fn from_api(api: Arc<dyn TidalApi>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self::new(Arc::new(ProviderCredential::new(Provider::Tidal, api)), fetcher)
    }

    pub fn credential(&self) -> &Arc<ProviderCredential<dyn TidalApi>> {
        &self.credential
    }

    async fn playback(
        &self,
        track_id: &str,
        quality: &str,
        mode: PlaybackMode,
    ) -> Result<TidalPlaybackInfo> {
        info!(track_id, quality, mode = mode.as_str(), "fetching tidal playback info");
        let api = self.credential.api();
        self.credential
            .with_credential(|session| async move {
                api.playback_info(&session, track_id, quality, mode).await
            })
            .await
    }

    /// `OFFLINE` d'abord, `STREAM` en repli
    async fn resolve_playback(
        &self,
        track_id: &str,
        quality: &str,
    ) -> Result<(PlaybackMode, TidalPlaybackInfo)> {
        match self.playback(track_id, quality, PlaybackMode::Offline).await {
            Ok(offline) if tier(&offline.audio_quality) >= tier(quality) => {
                Ok((PlaybackMode::Offline, offline))
            }
            Ok(offline) => {
                warn!(
                    track_id,
                    wanted = quality,
                    got = %offline.audio_quality,
                    "offline quality degraded, trying STREAM"
                );
                match self.playback(track_id, quality, PlaybackMode::Stream).await {
                    Ok(stream) if tier(&stream.audio_quality) > tier(&offline.audio_quality) => {
                        Ok((PlaybackMode::Stream, stream))
                    }
                    _ => Ok((PlaybackMode::Offline, offline)),
                }
            }
            Err(err) if err.kind() == ErrorKind::Upstream => {
                warn!(track_id, quality, "offline playback failed, falling back to STREAM: {}", err);
                let stream = self.playback(track_id, quality, PlaybackMode::Stream).await?;
                Ok((PlaybackMode::Stream, stream))
            }
            Err(err) => Err(err),
        }
    }

    /// Ouvre le média décrit par `playback`
    async fn open_playback(
        &self,
        track: &Track,
        encoding: &Encoding,
        playback: &TidalPlaybackInfo,
    ) -> Result<StreamSession> {
        let manifest = TidalManifest::decode(playback)?;

        let actual = match quality_encoding(&playback.audio_quality) {
            Some((_, quality)) => {
                let format = match manifest.format() {
                    AudioFormat::Unknown => encoding.format,
                    format => format,
                };
                Encoding::new(format, quality, playback.audio_quality.clone())
            }
            None => encoding.clone(),
        };

        match manifest {
            TidalManifest::Bts(bts) => {
                debug!(track_id = %track.id, format = %actual.format, quality = %actual.quality, encrypted = bts.is_encrypted(), "tidal BTS manifest decoded");
                let url = bts
                    .urls
                    .first()
                    .ok_or_else(|| StreamError::upstream("manifest lists no URL"))?;
                let key = if bts.is_encrypted() {
                    let key_id = bts.key_id.as_deref().ok_or_else(|| {
                        StreamError::decryption("encrypted manifest without key id")
                    })?;
                    Some(self.credential.api().unwrap_key(key_id)?)
                } else {
                    None
                };

                let media = self.fetcher.fetch(url).await?;
                let stream = match key {
                    Some(key) => decrypt_ctr(media.stream, &key),
                    None => media.stream,
                };
                Ok(StreamSession::new(Provider::Tidal, &track.id, actual, stream)
                    .with_content_length(media.content_length))
            }
            TidalManifest::Dash(dash) => {
                let mut urls = dash.segment_urls().into_iter();
                let Some(init_url) = urls.next() else {
                    return Err(StreamError::upstream("DASH manifest lists no segment"));
                };
                debug!(track_id = %track.id, format = %actual.format, quality = %actual.quality, segments = dash.segments.len(), "tidal DASH manifest decoded");

                // Le segment d'initialisation est lu tout de suite pour que
                // l'échec d'ouverture soit visible ici.
                let init = self.fetcher.fetch(&init_url).await?;
                let rest = chain_segments(self.fetcher.clone(), urls.collect());
                let stream = init.stream.chain(rest).boxed();
                Ok(StreamSession::new(Provider::Tidal, &track.id, actual, stream))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for TidalAdapter {
    fn provider(&self) -> Provider {
        Provider::Tidal
    }

    fn validate_track_id(&self, id: &str) -> Result<()> {
        check_alphanumeric(Provider::Tidal, id, None)
    }

    async fn fetch_catalog(&self, kind: CatalogKind, id: &str) -> Result<CatalogItem> {
        let api = self.credential.api();
        let credential = &self.credential;
        match kind {
            CatalogKind::Album => credential
                .with_credential(|session| async move { api.album(&session, id).await })
                .await
                .map(CatalogItem::Album),
            CatalogKind::Playlist => credential
                .with_credential(|session| async move { api.playlist(&session, id).await })
                .await
                .map(CatalogItem::Playlist),
            _ => Err(kind.unsupported(Provider::Tidal)),
        }
    }

    async fn fetch_track_metadata(&self, id: &str) -> Result<Track> {
        let api = self.credential.api();
        let info = self
            .credential
            .with_credential(|session| async move { api.track(&session, id).await })
            .await?;

        // Every quality up to the advertised one is offered.
        let best = QUALITIES
            .iter()
            .position(|q| tier(q) == tier(&info.audio_quality))
            .ok_or_else(|| {
                StreamError::upstream(format!("unknown tidal quality {}", info.audio_quality))
            })?;
        let encodings = QUALITIES[..=best]
            .iter()
            .filter_map(|q| {
                let (format, quality) = quality_encoding(q)?;
                Some(Encoding::new(format, quality, *q))
            })
            .collect();

        Track::new(
            Provider::Tidal,
            info.id,
            info.title,
            info.artists,
            info.album,
            info.duration_secs * 1000,
            encodings,
        )
    }

    async fn open_stream(&self, track: &Track, encoding: &Encoding) -> Result<StreamSession> {
        if !track.encodings.contains(encoding) {
            return Err(unknown_encoding(track, encoding));
        }
        let quality = encoding.source_id.as_str();
        let (mode, playback) = self.resolve_playback(&track.id, quality).await?;
        match self.open_playback(track, encoding, &playback).await {
            Ok(session) => Ok(session),
            Err(err) if mode == PlaybackMode::Offline && !err.is_auth_error() => {
                warn!(track_id = %track.id, quality, "offline media failed to open, falling back to STREAM: {}", err);
                let stream = self
                    .playback(&track.id, quality, PlaybackMode::Stream)
                    .await?;
                self.open_playback(track, encoding, &stream).await
            }
            Err(err) => Err(err),
        }
    }
}
