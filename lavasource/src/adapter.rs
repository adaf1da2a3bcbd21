//! Interface commune des fournisseurs
//!
//! Le pipeline ne voit que [`Track`], [`Encoding`] et [`StreamSession`] ;
//! les types des clients externes restent dans chaque adaptateur.

use crate::catalog::{CatalogItem, CatalogKind, check_catalog_id};
use crate::error::{Result, StreamError};
use crate::models::{Encoding, Provider, Track};
use crate::negotiator::QualityPolicy;
use crate::providers::{DeezerAdapter, SpotifyAdapter, TidalAdapter};
use crate::session::StreamSession;
use async_trait::async_trait;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Rejette les identifiants mal formés avant tout appel réseau
    fn validate_track_id(&self, id: &str) -> Result<()>;

    fn default_policy(&self) -> QualityPolicy {
        QualityPolicy::default_for(self.provider())
    }

    /// Résout le morceau et ses encodages disponibles
    async fn fetch_track_metadata(&self, id: &str) -> Result<Track>;

    /// Ouvre un flux déjà déchiffré pour `encoding`
    async fn open_stream(&self, track: &Track, encoding: &Encoding) -> Result<StreamSession>;

    fn validate_catalog_id(&self, kind: CatalogKind, id: &str) -> Result<()> {
        check_catalog_id(self.provider(), kind, id)
    }

    /// Album, playlist, podcast... ; `NotFound` pour une collection non servie
    async fn fetch_catalog(&self, kind: CatalogKind, _id: &str) -> Result<CatalogItem> {
        Err(kind.unsupported(self.provider()))
    }

    /// Résout un épisode de podcast comme un morceau relayable
    async fn fetch_episode_metadata(&self, _id: &str) -> Result<Track> {
        Err(CatalogKind::Episode.unsupported(self.provider()))
    }
}

/// Ensemble fermé des fournisseurs
pub enum Adapter {
    Spotify(SpotifyAdapter),
    Tidal(TidalAdapter),
    Deezer(DeezerAdapter),
}

macro_rules! dispatch {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            Adapter::Spotify($adapter) => $call,
            Adapter::Tidal($adapter) => $call,
            Adapter::Deezer($adapter) => $call,
        }
    };
}

#[async_trait]
impl ProviderAdapter for Adapter {
    fn provider(&self) -> Provider {
        dispatch!(self, a => a.provider())
    }

    fn validate_track_id(&self, id: &str) -> Result<()> {
        dispatch!(self, a => a.validate_track_id(id))
    }

    fn default_policy(&self) -> QualityPolicy {
        dispatch!(self, a => a.default_policy())
    }

    async fn fetch_track_metadata(&self, id: &str) -> Result<Track> {
        dispatch!(self, a => a.fetch_track_metadata(id).await)
    }

    async fn open_stream(&self, track: &Track, encoding: &Encoding) -> Result<StreamSession> {
        dispatch!(self, a => a.open_stream(track, encoding).await)
    }

    fn validate_catalog_id(&self, kind: CatalogKind, id: &str) -> Result<()> {
        dispatch!(self, a => a.validate_catalog_id(kind, id))
    }

    async fn fetch_catalog(&self, kind: CatalogKind, id: &str) -> Result<CatalogItem> {
        dispatch!(self, a => a.fetch_catalog(kind, id).await)
    }

    async fn fetch_episode_metadata(&self, id: &str) -> Result<Track> {
        dispatch!(self, a => a.fetch_episode_metadata(id).await)
    }
}

impl From<SpotifyAdapter> for Adapter {
    fn from(adapter: SpotifyAdapter) -> Self {
        Adapter::Spotify(adapter)
    }
}

impl From<TidalAdapter> for Adapter {
    fn from(adapter: TidalAdapter) -> Self {
        Adapter::Tidal(adapter)
    }
}

impl From<DeezerAdapter> for Adapter {
    fn from(adapter: DeezerAdapter) -> Self {
        Adapter::Deezer(adapter)
    }
}

/// Identifiant composé uniquement de caractères ASCII alphanumériques,
/// de longueur `exact_len` si elle est donnée
pub(crate) fn check_alphanumeric(
    provider: Provider,
    id: &str,
    exact_len: Option<usize>,
) -> Result<()> {
    let valid = !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_alphanumeric())
        && exact_len.is_none_or(|len| id.len() == len);
    if valid {
        Ok(())
    } else {
        Err(StreamError::invalid_track_id(format!(
            "'{}' is not a valid {} track id",
            id, provider
        )))
    }
}

/// Encodage demandé introuvable dans le morceau
pub(crate) fn unknown_encoding(track: &Track, encoding: &Encoding) -> StreamError {
    StreamError::unsupported_format(format!(
        "encoding {} is not offered for track {}",
        encoding.source_id, track.id
    ))
}
