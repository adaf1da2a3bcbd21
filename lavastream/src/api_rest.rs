//! Routes HTTP de la passerelle
//!
//! - `GET /{id}` et `GET /{id}/listen` : Spotify
//! - `GET /tidal/{id}` et `GET /tidal/{id}/listen`
//! - `GET /deezer/{id}` et `GET /deezer/{id}/listen`
//! - collections : `GET /album/{id}`, `/playlist/{id}`, `/show/{id}`,
//!   `/episode/{id}` (Spotify), `/tidal/album/{id}`, `/tidal/playlist/{id}`,
//!   `/deezer/album/{id}`, `/deezer/playlist/{id}`, `/deezer/artist/{id}`
//! - `GET /episode/{id}/listen` : épisode de podcast Spotify
//! - `GET /meta/region` : pays du compte Spotify
//!
//! Les réponses JSON suivent l'enveloppe
//! `{"error": <message>, "code": <status>, "data": <payload>}`.

use crate::gateway::Gateway;
use crate::pipeline::PreparedStream;
use crate::query::ListenOverrides;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use lavasource::{CatalogItem, CatalogKind, Provider, StreamError, Track};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

// ============ Gestion des erreurs ============

pub struct AppError(StreamError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(Envelope::<()> {
            error: self.0.to_string(),
            code: status.as_u16(),
            data: None,
        });
        (status, body).into_response()
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: String,
    pub code: u16,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            error: "Success".to_string(),
            code: 200,
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EncodingView {
    pub format: &'static str,
    pub quality: &'static str,
    pub mime_type: &'static str,
    pub requires_full_buffer: bool,
}

/// Métadonnées exposées ; `duration` en millisecondes
#[derive(Debug, Serialize)]
pub struct TrackView {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration: u64,
    pub provider: &'static str,
    pub encodings: Vec<EncodingView>,
}

impl From<Track> for TrackView {
    fn from(track: Track) -> Self {
        Self {
            encodings: track
                .encodings
                .iter()
                .map(|e| EncodingView {
                    format: e.format.name(),
                    quality: e.quality.name(),
                    mime_type: e.format.mime_type(),
                    requires_full_buffer: e.requires_full_buffer,
                })
                .collect(),
            provider: track.provider.name(),
            id: track.id,
            title: track.title,
            artists: track.artists,
            album: track.album,
            duration: track.duration_ms,
        }
    }
}

/// Crée le router de la passerelle
pub fn create_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/meta/region", get(get_region))
        .route(
            "/episode/{id}/listen",
            get(
                |state: State<Arc<Gateway>>,
                 id: Path<String>,
                 query: Query<HashMap<String, String>>| {
                    listen_episode(state, id, query, Provider::Spotify)
                },
            ),
        )
        .merge(provider_routes(Provider::Spotify))
        .nest("/tidal", provider_routes(Provider::Tidal))
        .nest("/deezer", provider_routes(Provider::Deezer))
        .with_state(gateway)
}

fn provider_routes(provider: Provider) -> Router<Arc<Gateway>> {
    let catalog = CatalogKind::offered_by(provider)
        .iter()
        .fold(Router::new(), |router, &kind| {
            router.route(
                &format!("/{}/{{id}}", kind.name()),
                get(move |state: State<Arc<Gateway>>, id: Path<String>| {
                    get_catalog(state, id, provider, kind)
                }),
            )
        });

    catalog
        .route(
            "/{id}",
            get(move |state: State<Arc<Gateway>>, id: Path<String>| {
                get_track(state, id, provider)
            }),
        )
        .route(
            "/{id}/listen",
            get(
                move |state: State<Arc<Gateway>>,
                      id: Path<String>,
                      query: Query<HashMap<String, String>>| {
                    listen(state, id, query, provider)
                },
            ),
        )
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn index() -> &'static str {
    "</>"
}

/// GET /{id}
async fn get_track(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
    provider: Provider,
) -> Result<Json<Envelope<TrackView>>, AppError> {
    let track = gateway.track(provider, &id).await?;
    Ok(Json(Envelope::success(TrackView::from(track))))
}

/// GET /album/{id}, /playlist/{id}...
async fn get_catalog(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
    provider: Provider,
    kind: CatalogKind,
) -> Result<Json<Envelope<CatalogItem>>, AppError> {
    let item = gateway.catalog(provider, kind, &id).await?;
    Ok(Json(Envelope::success(item)))
}

/// GET /meta/region
async fn get_region(
    State(gateway): State<Arc<Gateway>>,
) -> Result<Json<Envelope<String>>, AppError> {
    let country = gateway.region().await?;
    Ok(Json(Envelope::success(country)))
}

/// GET /{id}/listen
async fn listen(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    provider: Provider,
) -> Result<Response, AppError> {
    let overrides = ListenOverrides::from_query(&params);
    let prepared = gateway.open(provider, &id, &overrides).await?;
    Ok(stream_response(prepared, gateway.chunk_size()))
}

/// GET /episode/{id}/listen
async fn listen_episode(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    provider: Provider,
) -> Result<Response, AppError> {
    let overrides = ListenOverrides::from_query(&params);
    let prepared = gateway.open_episode(provider, &id, &overrides).await?;
    Ok(stream_response(prepared, gateway.chunk_size()))
}

fn stream_response(prepared: PreparedStream, chunk_size: usize) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(prepared.content_type()),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) =
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", prepared.filename()))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(len) = prepared.content_length() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    let body = Body::from_stream(prepared.into_relay(chunk_size).into_stream());
    (StatusCode::OK, headers, body).into_response()
}
