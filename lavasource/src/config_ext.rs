//! Extension pour lire les sections `providers.*` de lavaconfig
//!
//! Ce module fournit le trait `SourceConfigExt`, implémenté pour
//! `lavaconfig::Config`.

use crate::models::{Provider, QualityTier};
use crate::negotiator::QualityPolicy;
use anyhow::{Result, anyhow};
use lavaconfig::Config;
use lavamedia::AudioFormat;
use serde_yaml::Value;
use tracing::warn;

/// Trait d'extension pour la configuration des fournisseurs
///
/// # Exemple
///
/// ```rust,ignore
/// use lavaconfig::get_config;
/// use lavasource::{Provider, SourceConfigExt};
///
/// let config = get_config();
/// if config.is_provider_enabled(Provider::Deezer) {
///     let arl = config.get_deezer_arl()?;
/// }
/// ```
pub trait SourceConfigExt {
    /// Indique si le fournisseur est activé (`providers.<name>.enabled`)
    fn is_provider_enabled(&self, provider: Provider) -> bool;

    fn set_provider_enabled(&self, provider: Provider, enabled: bool) -> Result<()>;

    /// Politique de qualité configurée
    ///
    /// Les noms de formats inconnus sont ignorés ; une liste vide revient à
    /// la politique par défaut du fournisseur.
    fn get_provider_policy(&self, provider: Provider) -> QualityPolicy;

    fn set_provider_formats(&self, provider: Provider, formats: &[AudioFormat]) -> Result<()>;

    fn set_provider_max_quality(&self, provider: Provider, max: Option<QualityTier>) -> Result<()>;

    /// Identifiants Spotify (le mot de passe peut être scellé)
    fn get_spotify_credentials(&self) -> Result<(String, String)>;

    fn get_tidal_client_id(&self) -> Option<String>;

    /// Cookie ARL Deezer
    ///
    /// # Errors
    ///
    /// Retourne une erreur si l'ARL n'est pas configuré
    fn get_deezer_arl(&self) -> Result<String>;
}

impl SourceConfigExt for Config {
    fn is_provider_enabled(&self, provider: Provider) -> bool {
        matches!(
            self.get_value(&["providers", provider.name(), "enabled"]),
            Ok(Value::Bool(true))
        )
    }

    fn set_provider_enabled(&self, provider: Provider, enabled: bool) -> Result<()> {
        self.set_value(&["providers", provider.name(), "enabled"], Value::Bool(enabled))
    }

    fn get_provider_policy(&self, provider: Provider) -> QualityPolicy {
        let mut formats = Vec::new();
        if let Ok(Value::Sequence(names)) = self.get_value(&["providers", provider.name(), "formats"]) {
            for name in names {
                match name.as_str().and_then(AudioFormat::from_name) {
                    Some(format) if !formats.contains(&format) => formats.push(format),
                    Some(_) => {}
                    None => warn!(%provider, format = ?name, "ignoring unknown format in configuration"),
                }
            }
        }

        let max_quality = match self.get_string(&["providers", provider.name(), "max_quality"]) {
            Some(name) => {
                let tier = QualityTier::from_name(&name);
                if tier.is_none() {
                    warn!(%provider, max_quality = %name, "ignoring unknown quality tier");
                }
                tier
            }
            None => None,
        };

        let policy = if formats.is_empty() {
            QualityPolicy::default_for(provider)
        } else {
            QualityPolicy::new(formats)
        };
        policy.with_max_quality(max_quality)
    }

    fn set_provider_formats(&self, provider: Provider, formats: &[AudioFormat]) -> Result<()> {
        let names = formats
            .iter()
            .map(|f| Value::String(f.name().to_string()))
            .collect();
        self.set_value(&["providers", provider.name(), "formats"], Value::Sequence(names))
    }

    fn set_provider_max_quality(&self, provider: Provider, max: Option<QualityTier>) -> Result<()> {
        let value = match max {
            Some(tier) => Value::String(tier.name().to_string()),
            None => Value::Null,
        };
        self.set_value(&["providers", provider.name(), "max_quality"], value)
    }

    fn get_spotify_credentials(&self) -> Result<(String, String)> {
        let username = self
            .get_string(&["providers", "spotify", "username"])
            .ok_or_else(|| anyhow!("providers.spotify.username is not configured"))?;
        let password = self
            .get_secret(&["providers", "spotify", "password"])?
            .ok_or_else(|| anyhow!("providers.spotify.password is not configured"))?;
        Ok((username, password))
    }

    fn get_tidal_client_id(&self) -> Option<String> {
        self.get_string(&["providers", "tidal", "client_id"])
    }

    fn get_deezer_arl(&self) -> Result<String> {
        self.get_secret(&["providers", "deezer", "arl"])?
            .ok_or_else(|| anyhow!("providers.deezer.arl is required to use Deezer"))
    }
}
