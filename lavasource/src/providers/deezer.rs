//! Deezer
//!
//! La session repose sur le cookie ARL (`providers.deezer.arl`). Les médias
//! servis depuis `/mobile/` ou `/media/` sont chiffrés par bandes Blowfish ;
//! la clé de chaque morceau est fournie par le client externe.

use crate::adapter::{ProviderAdapter, check_alphanumeric, unknown_encoding};
use crate::catalog::{Album, CatalogItem, CatalogKind, Playlist, TrackSummary};
use crate::credential::{Authenticator, ProviderCredential};
use crate::crypto::decrypt_stripes;
use crate::error::{Result, StreamError};
use crate::fetch::MediaFetcher;
use crate::models::{Encoding, Provider, QualityTier, Track};
use crate::session::StreamSession;
use async_trait::async_trait;
use lavamedia::AudioFormat;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DeezerSession {
    pub arl: String,
    pub license_token: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct DeezerTrackInfo {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_secs: u64,
    /// Formats disponibles (`MP3_128`, `MP3_320`, `FLAC`...), dans l'ordre du fournisseur
    pub formats: Vec<String>,
}

/// Client Deezer externe
#[async_trait]
pub trait DeezerApi: Authenticator<Credential = DeezerSession> {
    async fn track(&self, session: &DeezerSession, id: &str) -> Result<DeezerTrackInfo>;

    /// URL signée du média dans `format`
    async fn media_url(&self, session: &DeezerSession, id: &str, format: &str) -> Result<String>;

    /// Clé Blowfish du morceau
    fn track_key(&self, id: &str) -> [u8; 16];

    async fn album(&self, _session: &DeezerSession, id: &str) -> Result<Album> {
        Err(StreamError::not_found(format!("album {}", id)))
    }

    async fn playlist(&self, _session: &DeezerSession, id: &str) -> Result<Playlist> {
        Err(StreamError::not_found(format!("playlist {}", id)))
    }

    /// Morceaux les plus écoutés de l'artiste
    async fn artist_top_tracks(
        &self,
        _session: &DeezerSession,
        id: &str,
    ) -> Result<Vec<TrackSummary>> {
        Err(StreamError::not_found(format!("artist {}", id)))
    }
}

pub fn format_encoding(format: &str) -> Option<(AudioFormat, QualityTier)> {
    match format {
        "MP3_128" => Some((AudioFormat::Mp3, QualityTier::Normal)),
        "MP3_256" => Some((AudioFormat::Mp3, QualityTier::High)),
        "MP3_320" => Some((AudioFormat::Mp3, QualityTier::VeryHigh)),
        "FLAC" => Some((AudioFormat::Flac, QualityTier::Master)),
        _ => None,
    }
}

pub fn is_encrypted_url(url: &str) -> bool {
    url.contains("/mobile/") || url.contains("/media/")
}

pub struct DeezerAdapter {
    credential: Arc<ProviderCredential<dyn DeezerApi>>,
    fetcher: Arc<dyn MediaFetcher>,
}

impl DeezerAdapter {
    pub fn new(
        credential: Arc<ProviderCredential<dyn DeezerApi>>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self { credential, fetcher }
    }

    pub fn from_api(api: Arc<dyn DeezerApi>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self::new(Arc::new(ProviderCredential::new(Provider::Deezer, api)), fetcher)
    }

    pub fn credential(&self) -> &Arc<ProviderCredential<dyn DeezerApi>> {
        &self.credential
    }
}

#[async_trait]
impl ProviderAdapter for DeezerAdapter {
    fn provider(&self) -> Provider {
        Provider::Deezer
    }

    fn validate_track_id(&self, id: &str) -> Result<()> {
        check_alphanumeric(Provider::Deezer, id, None)
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
            CatalogKind::Artist => credential
                .with_credential(|session| async move { api.artist_top_tracks(&session, id).await })
                .await
                .map(CatalogItem::TopTracks),
            _ => Err(kind.unsupported(Provider::Deezer)),
        }
    }

    async fn fetch_track_metadata(&self, id: &str) -> Result<Track> {
        let api = self.credential.api();
        let info = self
            .credential
            .with_credential(|session| async move { api.track(&session, id).await })
            .await?;

        let encodings = info
            .formats
            .iter()
            .filter_map(|name| {
                let (format, quality) = format_encoding(name)?;
                Some(Encoding::new(format, quality, name.clone()))
            })
            .collect();

        Track::new(
            Provider::Deezer,
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
        let api = self.credential.api();
        let track_id = track.id.as_str();
        let format = encoding.source_id.as_str();
        let url = self
            .credential
            .with_credential(|session| async move { api.media_url(&session, track_id, format).await })
            .await?;

        let encrypted = is_encrypted_url(&url);
        info!(track_id, format, encrypted, "opening deezer media");
        let media = self.fetcher.fetch(&url).await?;
        let key = encrypted.then(|| api.track_key(track_id));

        // Stripping the padding changes the length, so none is announced.
        Ok(StreamSession::new(
            Provider::Deezer,
            track_id,
            encoding.clone(),
            decrypt_stripes(media.stream, key),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_urls() {
        assert!(is_encrypted_url("https://e-cdns-proxy-1.dzcdn.net/mobile/1/abc"));
        assert!(is_encrypted_url("https://cdns-proxy.dzcdn.net/media/1/abc"));
        assert!(!is_encrypted_url("https://cdn.example/plain/abc.mp3"));
    }

    #[test]
    fn test_formats() {
        assert_eq!(format_encoding("MP3_320"), Some((AudioFormat::Mp3, QualityTier::VeryHigh)));
        assert_eq!(format_encoding("FLAC"), Some((AudioFormat::Flac, QualityTier::Master)));
        assert_eq!(format_encoding("MP4_RA3"), None);
    }
}
