//! Négociation de la qualité
//!
//! [`select`] choisit un encodage parmi ceux proposés par le fournisseur :
//! le premier format de la politique disponible l'emporte, puis le palier
//! le plus élevé sous le plafond. À palier égal, l'ordre du fournisseur
//! départage.

use crate::error::{Result, StreamError};
use crate::models::{Encoding, Provider, QualityTier};
use lavamedia::AudioFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Politique de préférence d'un fournisseur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPolicy {
    /// Formats acceptés, du préféré au moins préféré
    pub formats: Vec<AudioFormat>,
    /// Plafond de qualité ; `None` = le plus haut disponible
    pub max_quality: Option<QualityTier>,
}

impl QualityPolicy {
    pub fn new(formats: Vec<AudioFormat>) -> Self {
        Self {
            formats,
            max_quality: None,
        }
    }

    /// Politique par défaut de chaque fournisseur
    pub fn default_for(provider: Provider) -> Self {
        match provider {
            Provider::Spotify => Self::new(vec![AudioFormat::OggVorbis, AudioFormat::Mp3]),
            Provider::Tidal => {
                Self::new(vec![AudioFormat::Flac, AudioFormat::Aac, AudioFormat::Alac])
            }
            Provider::Deezer => Self::new(vec![AudioFormat::Flac, AudioFormat::Mp3]),
        }
    }

    pub fn with_max_quality(mut self, max_quality: Option<QualityTier>) -> Self {
        self.max_quality = max_quality;
        self
    }

    /// Place `format` en tête de la politique
    ///
    /// Un format absent de la politique la laisse inchangée : une préférence
    /// ne peut pas élargir l'ensemble des formats acceptés.
    pub fn prefer(mut self, format: AudioFormat) -> Self {
        if let Some(pos) = self.formats.iter().position(|f| *f == format) {
            let preferred = self.formats.remove(pos);
            self.formats.insert(0, preferred);
        } else {
            debug!(%format, "preferred format is not in the policy, ignored");
        }
        self
    }
}

/// Choisit l'encodage à ouvrir
///
/// Si le format retenu n'a aucun palier sous le plafond, le palier le plus
/// bas au-dessus est pris plutôt que de passer au format suivant.
pub fn select(available: &[Encoding], policy: &QualityPolicy) -> Result<Encoding> {
    let ceiling = policy.max_quality.unwrap_or(QualityTier::Master);

    for format in &policy.formats {
        let candidates: Vec<&Encoding> = available.iter().filter(|e| e.format == *format).collect();
        if candidates.is_empty() {
            continue;
        }

        let mut best: Option<&Encoding> = None;
        for candidate in candidates.iter().filter(|e| e.quality <= ceiling) {
            if best.is_none_or(|b| candidate.quality > b.quality) {
                best = Some(*candidate);
            }
        }
        if best.is_none() {
            for candidate in &candidates {
                if best.is_none_or(|b| candidate.quality < b.quality) {
                    best = Some(*candidate);
                }
            }
        }

        if let Some(chosen) = best {
            debug!(
                format = %chosen.format,
                quality = %chosen.quality,
                ceiling = %ceiling,
                "encoding selected"
            );
            return Ok(chosen.clone());
        }
    }

    let offered = available
        .iter()
        .map(|e| format!("{}/{}", e.format, e.quality))
        .collect::<Vec<_>>()
        .join(", ");
    Err(StreamError::unsupported_format(format!(
        "no encoding matches the preferred formats (offered: {})",
        if offered.is_empty() { "none" } else { &offered }
    )))
}
