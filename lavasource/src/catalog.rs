//! Collections exposées par les routes de métadonnées
//!
//! Albums, playlists, podcasts et top d'un artiste ne sont jamais relayés
//! en audio : ce sont de simples listes de morceaux que le client rejoue
//! ensuite via les routes `listen`.

use crate::error::{Result, StreamError};
use crate::models::Provider;
use serde::Serialize;
use std::fmt;

/// Morceau tel qu'il apparaît dans une collection ; `duration` en millisecondes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub album: String,
    pub image: Option<String>,
    pub artists: Vec<String>,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub artists: Vec<Artist>,
    pub tracks: Vec<TrackSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub tracks: Vec<TrackSummary>,
}

/// Épisode de podcast ; `duration` en millisecondes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub show: String,
    pub image: Option<String>,
    pub publisher: String,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Show {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub episodes: Vec<Episode>,
}

/// Nature d'une collection, segment de chemin compris
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Album,
    Playlist,
    Show,
    Episode,
    /// Morceaux les plus écoutés d'un artiste
    Artist,
}

impl CatalogKind {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogKind::Album => "album",
            CatalogKind::Playlist => "playlist",
            CatalogKind::Show => "show",
            CatalogKind::Episode => "episode",
            CatalogKind::Artist => "artist",
        }
    }

    /// Collections servies par chaque fournisseur
    pub fn offered_by(provider: Provider) -> &'static [CatalogKind] {
        match provider {
            Provider::Spotify => &[
                CatalogKind::Album,
                CatalogKind::Playlist,
                CatalogKind::Show,
                CatalogKind::Episode,
            ],
            Provider::Tidal => &[CatalogKind::Album, CatalogKind::Playlist],
            Provider::Deezer => &[CatalogKind::Album, CatalogKind::Playlist, CatalogKind::Artist],
        }
    }

    pub(crate) fn unsupported(&self, provider: Provider) -> StreamError {
        StreamError::not_found(format!("{} has no {} catalog", provider, self))
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Réponse d'une route de collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CatalogItem {
    Album(Album),
    Playlist(Playlist),
    Show(Show),
    Episode(Episode),
    TopTracks(Vec<TrackSummary>),
}

/// Identifiants de collection Tidal et Deezer : alphanumériques, tirets
/// admis pour les UUID de playlists
pub(crate) fn check_catalog_id(provider: Provider, kind: CatalogKind, id: &str) -> Result<()> {
    let dashes = kind == CatalogKind::Playlist;
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || (dashes && b == b'-'));
    if valid {
        Ok(())
    } else {
        Err(StreamError::invalid_track_id(format!(
            "'{}' is not a valid {} {} id",
            id, provider, kind
        )))
    }
}
