//! # Module Server - API de haut niveau pour Axum
//!
//! Ce module cache la construction du routeur Axum derrière quelques
//! méthodes : routes JSON, handlers avec état, sous-routeurs et API
//! documentées par OpenAPI. Les routes peuvent être ajoutées tant que le
//! serveur n'est pas démarré.

use crate::logs::{LogState, LogsApiDoc, create_logs_router, init_logging, log_dump, log_sse};
use anyhow::{Context, Result};
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use lavaconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};
use utoipa::OpenApi;

const DEFAULT_NAME: &str = "Spotilava";

/// Info serveur sérialisable
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - URL de base annoncée (peut être vide)
    /// * `http_port` - Port HTTP à écouter (`0` : port choisi par le système)
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            local_addr: None,
            log_state: None,
        }
    }

    /// Crée un serveur à partir de la configuration globale
    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new(DEFAULT_NAME, config.get_base_url(), config.get_http_port())
    }

    async fn mount(&self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Ajoute une route JSON dynamique
    ///
    /// La closure est appelée à chaque requête GET sur `path` et son
    /// résultat est sérialisé en JSON.
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };
        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Ajoute un handler GET avec état
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        if path == "/" {
            self.mount("/", sub_router).await;
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            self.mount(&normalized, sub_router).await;
        }
    }

    /// Ajoute une API documentée
    ///
    /// Les routes de `api_router` sont servies sous `/api/{name}` et la
    /// spécification OpenAPI sous `/api-docs/{name}.json`.
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        let doc = Arc::new(openapi);
        let doc_route = Router::new().route(
            &format!("/api-docs/{}.json", name),
            get(move || {
                let doc = doc.clone();
                async move { Json((*doc).clone()) }
            }),
        );

        let nested = Router::new().nest(&format!("/api/{}", name), api_router);
        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(nested).merge(doc_route);
    }

    /// Copie du routeur courant, utilisable sans démarrer le serveur
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Démarre le serveur HTTP
    ///
    /// Le port est ouvert avant le retour, une erreur de bind remonte donc
    /// à l'appelant. Ctrl+C arrête le serveur.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind {}", addr))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!(
            name = %self.name,
            base_url = %self.base_url,
            port = local_addr.port(),
            "Server running"
        );

        let router = self.router().await;
        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                error!("HTTP server stopped: {}", e);
            }
        });

        let shutdown_task = tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down"),
                Err(e) => error!("failed to listen for Ctrl+C: {}", e),
            }
        });

        self.join_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = server_task => {},
                _ = shutdown_task => {},
            }
        }));
        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Adresse effectivement écoutée, une fois démarré
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.local_addr.map_or(self.http_port, |a| a.port()),
        }
    }

    /// Initialise le système de logging et enregistre les routes de logs
    ///
    /// Routes enregistrées :
    ///
    /// - `GET /log-sse` : flux SSE des logs
    /// - `GET /log-dump` : contenu du tampon en JSON
    /// - `GET|POST /api/logs/log_setup` : niveau de log courant
    /// - `GET /api-docs/logs.json` : spécification OpenAPI
    pub async fn init_logging(&mut self) -> LogState {
        let log_state = init_logging();
        self.register_log_routes(log_state.clone()).await;
        log_state
    }

    /// Enregistre les routes de logs pour un `LogState` existant
    pub async fn register_log_routes(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_openapi(
            create_logs_router(log_state.clone()),
            LogsApiDoc::openapi(),
            "logs",
        )
        .await;
        self.log_state = Some(log_state);
    }

    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
        }
    }

    /// Builder initialisé depuis `host.base_url` et `host.http_port`
    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: DEFAULT_NAME.to_string(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Construit le serveur
    pub fn build(self) -> Server {
        Server::new(self.name, self.base_url, self.http_port)
    }
}
