//! Modèle de données partagé par les adaptateurs et le pipeline

use lavamedia::{AudioFormat, TrackTags};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fournisseurs de musique pris en charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Tidal,
    Deezer,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Spotify, Provider::Tidal, Provider::Deezer];

    /// Nom utilisé dans la configuration et les logs
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Tidal => "tidal",
            Provider::Deezer => "deezer",
        }
    }

    /// Préfixe du nom de fichier annoncé dans `Content-Disposition`
    pub fn filename_prefix(&self) -> &'static str {
        match self {
            Provider::Spotify => "",
            Provider::Tidal => "track_",
            Provider::Deezer => "track_deezer_",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Palier de qualité, ordonné du plus faible au plus élevé
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    Low,
    Normal,
    High,
    VeryHigh,
    Master,
}

impl QualityTier {
    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::Low => "LOW",
            QualityTier::Normal => "NORMAL",
            QualityTier::High => "HIGH",
            QualityTier::VeryHigh => "VERY_HIGH",
            QualityTier::Master => "MASTER",
        }
    }

    /// Parse un nom de palier (`very_high`, `VERY-HIGH`, `master`...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "LOW" => Some(QualityTier::Low),
            "NORMAL" => Some(QualityTier::Normal),
            "HIGH" => Some(QualityTier::High),
            "VERY_HIGH" | "VERYHIGH" => Some(QualityTier::VeryHigh),
            "MASTER" => Some(QualityTier::Master),
            _ => None,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Variante (format, qualité) d'un morceau proposée par un fournisseur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub format: AudioFormat,
    pub quality: QualityTier,
    /// Le conteneur ne peut être tagué qu'une fois le fichier complet en mémoire
    pub requires_full_buffer: bool,
    /// Identifiant propre au fournisseur (fichier Spotify, qualité Tidal, format Deezer)
    pub source_id: String,
}

impl Encoding {
    pub fn new(format: AudioFormat, quality: QualityTier, source_id: impl Into<String>) -> Self {
        Self {
            format,
            quality,
            requires_full_buffer: format.requires_full_buffer(),
            source_id: source_id.into(),
        }
    }
}

/// Ce que désigne un identifiant relayable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Track,
    /// Épisode de podcast Spotify
    Episode,
}

/// Morceau résolu auprès d'un fournisseur
///
/// Construit pour une requête puis jeté ; la liste des encodages n'est
/// jamais vide (voir [`Track::new`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub provider: Provider,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    pub encodings: Vec<Encoding>,
    #[serde(default)]
    pub kind: MediaKind,
}

impl Track {
    /// Construit un morceau ; échoue en `NotFound` s'il n'a aucun encodage jouable
    pub fn new(
        provider: Provider,
        id: impl Into<String>,
        title: impl Into<String>,
        artists: Vec<String>,
        album: impl Into<String>,
        duration_ms: u64,
        encodings: Vec<Encoding>,
    ) -> crate::error::Result<Self> {
        let id = id.into();
        if encodings.is_empty() {
            return Err(crate::error::StreamError::not_found(format!(
                "no playable encoding for {} track {}",
                provider, id
            )));
        }
        Ok(Self {
            id,
            provider,
            title: title.into(),
            artists,
            album: album.into(),
            duration_ms,
            encodings,
            kind: MediaKind::Track,
        })
    }

    pub fn into_episode(mut self) -> Self {
        self.kind = MediaKind::Episode;
        self
    }

    /// Tags injectés dans le flux
    pub fn tags(&self) -> TrackTags {
        TrackTags {
            title: self.title.clone(),
            artists: self.artists.clone(),
            album: self.album.clone(),
            duration_ms: self.duration_ms,
        }
    }

    /// Nom de fichier annoncé au client, `ext` sans le point
    pub fn filename(&self, ext: &str) -> String {
        let prefix = match self.kind {
            MediaKind::Track => self.provider.filename_prefix(),
            MediaKind::Episode => "episode_",
        };
        format!("{}{}.{}", prefix, self.id, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_order() {
        assert!(QualityTier::Low < QualityTier::Normal);
        assert!(QualityTier::High < QualityTier::VeryHigh);
        assert!(QualityTier::VeryHigh < QualityTier::Master);
    }

    #[test]
    fn test_quality_names() {
        assert_eq!(QualityTier::from_name("very-high"), Some(QualityTier::VeryHigh));
        assert_eq!(QualityTier::from_name(" master "), Some(QualityTier::Master));
        assert_eq!(QualityTier::from_name("lossless"), None);
        assert_eq!(
            serde_json::to_string(&QualityTier::VeryHigh).unwrap(),
            "\"VERY_HIGH\""
        );
    }

    #[test]
    fn test_track_without_encoding_is_not_found() {
        let err = Track::new(Provider::Tidal, "1", "t", vec![], "a", 0, vec![]).unwrap_err();
        assert!(matches!(err, crate::error::StreamError::NotFound { .. }));
    }

    #[test]
    fn test_filenames() {
        let encodings = vec![Encoding::new(AudioFormat::Flac, QualityTier::Master, "HI_RES")];
        let track = Track::new(Provider::Deezer, "42", "t", vec![], "a", 0, encodings).unwrap();
        assert_eq!(track.filename("flac"), "track_deezer_42.flac");
        assert!(!track.encodings[0].requires_full_buffer);

        let encodings = vec![Encoding::new(AudioFormat::OggVorbis, QualityTier::High, "f")];
        let episode = Track::new(Provider::Spotify, "ep", "t", vec![], "s", 0, encodings)
            .unwrap()
            .into_episode();
        assert_eq!(episode.filename("ogg"), "episode_ep.ogg");
    }
}
