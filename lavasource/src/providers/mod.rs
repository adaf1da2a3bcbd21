//! Adaptateurs concrets
//!
//! Chaque adaptateur délègue le protocole (authentification, URLs signées,
//! dérivation des clés) à un client externe décrit par un trait.

pub mod deezer;
pub mod mpd;
pub mod spotify;
pub mod tidal;

pub use mpd::DashManifest;
pub use deezer::{DeezerAdapter, DeezerApi, DeezerSession, DeezerTrackInfo};
pub use spotify::{
    SpotifyAdapter, SpotifyApi, SpotifyAudioFile, SpotifyCredential, SpotifyEpisodeInfo,
    SpotifyTrackInfo,
};
pub use tidal::{PlaybackMode, TidalAdapter, TidalApi, TidalPlaybackInfo, TidalSession, TidalTrackInfo};
