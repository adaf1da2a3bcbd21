//! Extension lavaserver pour la passerelle
//!
//! `lavaserver` ne connaît pas `lavastream` : les routes de streaming sont
//! ajoutées à un `lavaserver::Server` via le trait [`GatewayServerExt`].

use crate::gateway::Gateway;
use anyhow::Result;
use lavasource::Adapter;
use std::sync::Arc;

/// Trait pour étendre lavaserver avec les routes de streaming
///
/// # Exemple
///
/// ```rust,ignore
/// use lavaserver::ServerBuilder;
/// use lavastream::GatewayServerExt;
///
/// let mut server = ServerBuilder::new_configured().build();
/// server.init_logging().await;
/// server.init_gateway(vec![spotify.into()]).await?;
/// server.start().await?;
/// server.wait().await;
/// ```
pub trait GatewayServerExt {
    /// Construit la passerelle depuis la configuration globale et
    /// enregistre ses routes
    ///
    /// # Routes enregistrées
    ///
    /// - `GET /` - Page d'accueil minimale
    /// - `GET /{id}`, `GET /{id}/listen` - Spotify
    /// - `GET /tidal/{id}`, `GET /tidal/{id}/listen`
    /// - `GET /deezer/{id}`, `GET /deezer/{id}/listen`
    async fn init_gateway(&mut self, adapters: Vec<Adapter>) -> Result<Arc<Gateway>>;

    /// Enregistre les routes d'une passerelle déjà construite
    async fn init_gateway_with(&mut self, gateway: Arc<Gateway>) -> Arc<Gateway>;
}
