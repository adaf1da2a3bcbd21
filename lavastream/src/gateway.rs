//! Passerelle : adaptateurs activés, politiques et taille de fenêtre
//!
//! La [`Gateway`] est partagée par toutes les requêtes. Elle est construite
//! une fois au démarrage, soit à la main avec [`GatewayBuilder`], soit à
//! partir de la configuration avec [`GatewayBuilder::from_config`].

use crate::pipeline::{PreparedStream, StreamPipeline};
use crate::query::ListenOverrides;
use anyhow::{Result as AnyResult, bail};
use lavaconfig::{Config, DEFAULT_CHUNK_SIZE, validate_chunk_size};
use lavasource::{
    Adapter, CatalogItem, CatalogKind, Provider, ProviderAdapter, QualityPolicy, Result,
    SourceConfigExt, Stage, StreamError, Track,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

struct Registered {
    adapter: Arc<Adapter>,
    policy: QualityPolicy,
}

pub struct Gateway {
    providers: HashMap<Provider, Registered>,
    chunk_size: usize,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fournisseurs servis, dans l'ordre de [`Provider::ALL`]
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }

    fn registered(&self, provider: Provider) -> Result<&Registered> {
        self.providers.get(&provider).ok_or_else(|| {
            StreamError::provider_disabled(format!("{} is not enabled", provider))
        })
    }

    pub fn policy(&self, provider: Provider) -> Result<QualityPolicy> {
        Ok(self.registered(provider)?.policy.clone())
    }

    /// Métadonnées d'un morceau
    pub async fn track(&self, provider: Provider, track_id: &str) -> Result<Track> {
        let registered = self.registered(provider)?;
        StreamPipeline::new(&registered.adapter, registered.policy.clone(), self.chunk_size)
            .resolve(track_id)
            .await
    }

    /// Exécute le pipeline jusqu'au relais
    pub async fn open(
        &self,
        provider: Provider,
        track_id: &str,
        overrides: &ListenOverrides,
    ) -> Result<PreparedStream> {
        let registered = self.registered(provider)?;
        let policy = overrides.apply(registered.policy.clone());
        StreamPipeline::new(&registered.adapter, policy, self.chunk_size)
            .prepare(track_id)
            .await
    }

    /// Comme [`Gateway::open`], pour un épisode de podcast
    pub async fn open_episode(
        &self,
        provider: Provider,
        episode_id: &str,
        overrides: &ListenOverrides,
    ) -> Result<PreparedStream> {
        let registered = self.registered(provider)?;
        let policy = overrides.apply(registered.policy.clone());
        StreamPipeline::new(&registered.adapter, policy, self.chunk_size)
            .episodes()
            .prepare(episode_id)
            .await
    }

    /// Album, playlist, podcast ou top d'un artiste
    pub async fn catalog(
        &self,
        provider: Provider,
        kind: CatalogKind,
        id: &str,
    ) -> Result<CatalogItem> {
        let adapter = &self.registered(provider)?.adapter;
        info!(%provider, %kind, id, "catalog requested");
        let fetched = async {
            adapter.validate_catalog_id(kind, id)?;
            adapter.fetch_catalog(kind, id).await
        };
        fetched
            .await
            .map_err(|e| e.with_context(provider, id, Stage::Resolving))
    }

    /// Pays du compte Spotify
    pub async fn region(&self) -> Result<String> {
        match self.registered(Provider::Spotify)?.adapter.as_ref() {
            Adapter::Spotify(spotify) => spotify.region().await,
            _ => Err(StreamError::provider_disabled("spotify is not enabled")),
        }
    }
}

pub struct GatewayBuilder {
    providers: HashMap<Provider, Registered>,
    chunk_size: usize,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Taille de la fenêtre de tête et des morceaux relayés, validée par [`GatewayBuilder::build`]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Ajoute un adaptateur avec la politique par défaut de son fournisseur
    pub fn adapter(self, adapter: impl Into<Adapter>) -> Self {
        let adapter = adapter.into();
        let policy = adapter.default_policy();
        self.adapter_with_policy(adapter, policy)
    }

    pub fn adapter_with_policy(mut self, adapter: impl Into<Adapter>, policy: QualityPolicy) -> Self {
        let adapter = adapter.into();
        self.providers.insert(
            adapter.provider(),
            Registered {
                adapter: Arc::new(adapter),
                policy,
            },
        );
        self
    }

    /// Construit la passerelle à partir de la configuration
    ///
    /// Les adaptateurs des fournisseurs désactivés sont ignorés. Deezer
    /// exige un cookie ARL non vide.
    pub fn from_config(
        config: &Config,
        adapters: impl IntoIterator<Item = Adapter>,
    ) -> AnyResult<Gateway> {
        let mut builder = Self::new().chunk_size(config.get_chunk_size()?);
        for adapter in adapters {
            let provider = adapter.provider();
            if !config.is_provider_enabled(provider) {
                info!(%provider, "provider disabled, not serving it");
                continue;
            }
            if provider == Provider::Deezer {
                config.get_deezer_arl()?;
            }
            let policy = config.get_provider_policy(provider);
            info!(%provider, formats = ?policy.formats, max_quality = ?policy.max_quality, "provider enabled");
            builder = builder.adapter_with_policy(adapter, policy);
        }
        builder.build()
    }

    pub fn build(self) -> AnyResult<Gateway> {
        let chunk_size = validate_chunk_size(self.chunk_size)?;
        if self.providers.is_empty() {
            bail!("no provider enabled");
        }
        Ok(Gateway {
            providers: self.providers,
            chunk_size,
        })
    }
}
