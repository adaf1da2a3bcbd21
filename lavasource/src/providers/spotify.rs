//! Spotify
//!
//! La session et le déchiffrement sont assurés par le client externe : les
//! octets reçus de [`SpotifyApi::open_audio`] sont déjà en clair.

use crate::adapter::{ProviderAdapter, check_alphanumeric, unknown_encoding};
use crate::catalog::{Album, CatalogItem, CatalogKind, Episode, Playlist, Show};
use crate::credential::{Authenticator, ProviderCredential};
use crate::error::{Result, StreamError};
use crate::fetch::FetchedMedia;
use crate::models::{Encoding, Provider, QualityTier, Track};
use crate::session::StreamSession;
use async_trait::async_trait;
use lavamedia::AudioFormat;
use std::sync::Arc;
use tracing::{debug, info};

/// Longueur d'un identifiant base62 Spotify
pub const SPOTIFY_ID_LEN: usize = 22;

/// Session établie par le client externe
#[derive(Debug, Clone)]
pub struct SpotifyCredential {
    pub username: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct SpotifyAudioFile {
    pub file_id: String,
    /// Nom du format Spotify (`OGG_VORBIS_320`, `MP3_256`...)
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct SpotifyTrackInfo {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    pub files: Vec<SpotifyAudioFile>,
}

#[derive(Debug, Clone)]
pub struct SpotifyEpisodeInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub show: String,
    pub publisher: String,
    pub image: Option<String>,
    pub duration_ms: u64,
    pub files: Vec<SpotifyAudioFile>,
}

impl SpotifyEpisodeInfo {
    fn summary(self) -> Episode {
        Episode {
            id: self.id,
            title: self.name,
            description: self.description,
            show: self.show,
            image: self.image,
            publisher: self.publisher,
            duration: self.duration_ms,
        }
    }
}

/// Client Spotify externe
///
/// Seuls les morceaux sont obligatoires ; un client sans catalogue répond
/// `NotFound` aux albums, playlists et podcasts.
#[async_trait]
pub trait SpotifyApi: Authenticator<Credential = SpotifyCredential> {
    async fn track(&self, credential: &SpotifyCredential, id: &str) -> Result<SpotifyTrackInfo>;

    /// `item_id` désigne un morceau ou un épisode
    async fn open_audio(
        &self,
        credential: &SpotifyCredential,
        item_id: &str,
        file_id: &str,
    ) -> Result<FetchedMedia>;

    async fn album(&self, _credential: &SpotifyCredential, id: &str) -> Result<Album> {
        Err(StreamError::not_found(format!("album {}", id)))
    }

    async fn playlist(&self, _credential: &SpotifyCredential, id: &str) -> Result<Playlist> {
        Err(StreamError::not_found(format!("playlist {}", id)))
    }

    async fn show(&self, _credential: &SpotifyCredential, id: &str) -> Result<Show> {
        Err(StreamError::not_found(format!("show {}", id)))
    }

    async fn episode(
        &self,
        _credential: &SpotifyCredential,
        id: &str,
    ) -> Result<SpotifyEpisodeInfo> {
        Err(StreamError::not_found(format!("episode {}", id)))
    }

    /// Code pays du compte (`FR`, `US`...)
    async fn country(&self, _credential: &SpotifyCredential) -> Result<String> {
        Err(StreamError::not_found("account country"))
    }
}

/// Format et palier d'un fichier Spotify ; `None` pour les formats non relayés
pub fn file_encoding(format: &str) -> Option<(AudioFormat, QualityTier)> {
    let encoding = match format {
        "OGG_VORBIS_96" => (AudioFormat::OggVorbis, QualityTier::Normal),
        "OGG_VORBIS_160" => (AudioFormat::OggVorbis, QualityTier::High),
        "OGG_VORBIS_320" => (AudioFormat::OggVorbis, QualityTier::VeryHigh),
        "MP3_96" => (AudioFormat::Mp3, QualityTier::Normal),
        "MP3_160" | "MP3_160_ENC" => (AudioFormat::Mp3, QualityTier::High),
        "MP3_256" | "MP3_320" => (AudioFormat::Mp3, QualityTier::VeryHigh),
        _ => return None,
    };
    Some(encoding)
}

fn usable_encodings(files: &[SpotifyAudioFile]) -> Vec<Encoding> {
    files
        .iter()
        .filter_map(|file| {
            let (format, quality) = file_encoding(&file.format)?;
            Some(Encoding::new(format, quality, file.file_id.clone()))
        })
        .collect()
}

pub struct SpotifyAdapter {
    credential: Arc<ProviderCredential<dyn SpotifyApi>>,
}

impl SpotifyAdapter {
    pub fn new(credential: Arc<ProviderCredential<dyn SpotifyApi>>) -> Self {
        Self { credential }
    }

    pub fn from_api(api: Arc<dyn SpotifyApi>) -> Self {
        Self::new(Arc::new(ProviderCredential::new(Provider::Spotify, api)))
    }

    pub fn credential(&self) -> &Arc<ProviderCredential<dyn SpotifyApi>> {
        &self.credential
    }

    /// Pays du compte connecté
    pub async fn region(&self) -> Result<String> {
        let api = self.credential.api();
        self.credential
            .with_credential(|credential| async move { api.country(&credential).await })
            .await
    }
}

#[async_trait]
impl ProviderAdapter for SpotifyAdapter {
    fn provider(&self) -> Provider {
        Provider::Spotify
    }

    fn validate_track_id(&self, id: &str) -> Result<()> {
        check_alphanumeric(Provider::Spotify, id, Some(SPOTIFY_ID_LEN))
    }

    async fn fetch_track_metadata(&self, id: &str) -> Result<Track> {
        let api = self.credential.api();
        let info = self
            .credential
            .with_credential(|credential| async move { api.track(&credential, id).await })
            .await?;

        let encodings = usable_encodings(&info.files);
        debug!(track_id = id, files = info.files.len(), usable = encodings.len(), "spotify track resolved");

        Track::new(
            Provider::Spotify,
            info.id,
            info.name,
            info.artists,
            info.album,
            info.duration_ms,
            encodings,
        )
    }

    fn validate_catalog_id(&self, kind: CatalogKind, id: &str) -> Result<()> {
        check_alphanumeric(Provider::Spotify, id, Some(SPOTIFY_ID_LEN)).map_err(|_| {
            StreamError::invalid_track_id(format!(
                "'{}' is not a valid spotify {} id, expected {} alphanumeric chars",
                id, kind, SPOTIFY_ID_LEN
            ))
        })
    }

    async fn fetch_catalog(&self, kind: CatalogKind, id: &str) -> Result<CatalogItem> {
        let api = self.credential.api();
        let credential = &self.credential;
        let item = match kind {
            CatalogKind::Album => CatalogItem::Album(
                credential
                    .with_credential(|c| async move { api.album(&c, id).await })
                    .await?,
            ),
            CatalogKind::Playlist => CatalogItem::Playlist(
                credential
                    .with_credential(|c| async move { api.playlist(&c, id).await })
                    .await?,
            ),
            CatalogKind::Show => CatalogItem::Show(
                credential
                    .with_credential(|c| async move { api.show(&c, id).await })
                    .await?,
            ),
            CatalogKind::Episode => CatalogItem::Episode(
                credential
                    .with_credential(|c| async move { api.episode(&c, id).await })
                    .await?
                    .summary(),
            ),
            CatalogKind::Artist => return Err(kind.unsupported(Provider::Spotify)),
        };
        debug!(%kind, id, "spotify catalog resolved");
        Ok(item)
    }

    async fn fetch_episode_metadata(&self, id: &str) -> Result<Track> {
        let api = self.credential.api();
        let info = self
            .credential
            .with_credential(|credential| async move { api.episode(&credential, id).await })
            .await?;

        let encodings = usable_encodings(&info.files);
        debug!(episode_id = id, files = info.files.len(), usable = encodings.len(), "spotify episode resolved");

        Track::new(
            Provider::Spotify,
            info.id,
            info.name,
            vec![info.publisher],
            info.show,
            info.duration_ms,
            encodings,
        )
        .map(Track::into_episode)
    }

    async fn open_stream(&self, track: &Track, encoding: &Encoding) -> Result<StreamSession> {
        if !track.encodings.contains(encoding) {
            return Err(unknown_encoding(track, encoding));
        }
        info!(track_id = %track.id, kind = ?track.kind, file_id = %encoding.source_id, quality = %encoding.quality, "opening spotify audio");

        let api = self.credential.api();
        let track_id = track.id.as_str();
        let file_id = encoding.source_id.as_str();
        let media = self
            .credential
            .with_credential(|credential| async move {
                api.open_audio(&credential, track_id, file_id).await
            })
            .await?;

        Ok(
            StreamSession::new(Provider::Spotify, &track.id, encoding.clone(), media.stream)
                .with_content_length(media.content_length),
        )
    }
}
