//! Paramètres de `/listen` : format préféré et plafond de qualité

use lavamedia::AudioFormat;
use lavasource::{QualityPolicy, QualityTier};
use std::collections::HashMap;

const FORMAT_KEYS: [&str; 2] = ["format", "fmt"];
const QUALITY_KEYS: [&str; 3] = ["q", "qual", "quality"];

/// Surcharges de la politique demandées par le client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenOverrides {
    pub format: Option<AudioFormat>,
    pub max_quality: Option<QualityTier>,
}

impl ListenOverrides {
    /// Lit les paramètres de requête ; les valeurs inconnues sont ignorées
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| params.get(*k))
                .map(|v| v.trim().to_ascii_lowercase())
        };
        Self {
            format: lookup(&FORMAT_KEYS).and_then(|v| AudioFormat::from_name(&v)),
            max_quality: lookup(&QUALITY_KEYS).and_then(|v| quality_alias(&v)),
        }
    }

    /// Applique les surcharges ; un format hors politique est ignoré
    pub fn apply(&self, policy: QualityPolicy) -> QualityPolicy {
        let policy = match self.format {
            Some(format) => policy.prefer(format),
            None => policy,
        };
        // le plafond configuré ne peut qu'être abaissé
        match (self.max_quality, policy.max_quality) {
            (Some(max), Some(configured)) => policy.with_max_quality(Some(max.min(configured))),
            (Some(max), None) => policy.with_max_quality(Some(max)),
            (None, _) => policy,
        }
    }
}

fn quality_alias(value: &str) -> Option<QualityTier> {
    match value {
        "lowest" | "low" | "lq" => Some(QualityTier::Normal),
        "medium" | "normal" => Some(QualityTier::High),
        "high" | "hq" | "highest" => Some(QualityTier::VeryHigh),
        "master" | "hires" => Some(QualityTier::Master),
        _ => None,
    }
}
