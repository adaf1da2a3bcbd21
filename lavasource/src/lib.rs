//! # lavasource - Fournisseurs de musique pour Spotilava
//!
//! Cette crate fournit tout ce qui se trouve entre un identifiant de
//! morceau et un flux d'octets en clair :
//!
//! - le modèle ([`Track`], [`Encoding`], [`QualityTier`]) ;
//! - la négociation de qualité ([`select`], [`QualityPolicy`]) ;
//! - les credentials partagés avec ré-authentification mutualisée
//!   ([`ProviderCredential`]) ;
//! - les adaptateurs Spotify, Tidal et Deezer derrière [`ProviderAdapter`],
//!   avec déchiffrement en ligne ;
//! - les collections (albums, playlists, podcasts) du [`catalog`].
//!
//! Le protocole de chaque service (login, URLs signées, dérivation des
//! clés) est délégué à des clients externes décrits par les traits
//! [`SpotifyApi`], [`TidalApi`] et [`DeezerApi`].

pub mod adapter;
pub mod catalog;
pub mod config_ext;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod models;
pub mod negotiator;
pub mod providers;
pub mod session;

pub use adapter::{Adapter, ProviderAdapter};
pub use catalog::{
    Album, Artist, CatalogItem, CatalogKind, Episode, Playlist, Show, TrackSummary,
};
pub use config_ext::SourceConfigExt;
pub use credential::{Authenticator, ProviderCredential};
pub use crypto::CtrKey;
pub use error::{ErrorContext, ErrorKind, Result, Stage, StreamError};
pub use fetch::{FetchedMedia, HttpFetcher, MediaFetcher};
pub use models::{Encoding, MediaKind, Provider, QualityTier, Track};
pub use negotiator::{QualityPolicy, select};
pub use providers::{
    DeezerAdapter, DeezerApi, DeezerSession, DeezerTrackInfo, PlaybackMode, SpotifyAdapter,
    SpotifyApi, SpotifyAudioFile, SpotifyCredential, SpotifyEpisodeInfo, SpotifyTrackInfo,
    TidalAdapter, TidalApi, TidalPlaybackInfo, TidalSession, TidalTrackInfo,
};
pub use session::{ByteStream, StreamSession};
