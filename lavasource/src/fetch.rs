//! Téléchargement des médias
//!
//! Les adaptateurs Tidal et Deezer obtiennent une URL signée puis lisent le
//! média via un [`MediaFetcher`]. L'implémentation par défaut repose sur
//! `reqwest` en mode streaming.

use crate::error::{Result, StreamError};
use crate::session::ByteStream;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("Spotilava/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Corps d'une réponse média
pub struct FetchedMedia {
    pub stream: ByteStream,
    pub content_length: Option<u64>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia>;
}

/// Client HTTP partagé par toutes les requêtes
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StreamError::upstream(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        debug!(%status, "media response received");
        if !status.is_success() {
            return Err(StreamError::from_status_code(
                status.as_u16(),
                format!("media request returned {}", status),
            ));
        }

        let content_length = response.content_length();
        if content_length.is_none() {
            warn!("media response has no Content-Length header");
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::from))
            .boxed();
        Ok(FetchedMedia {
            stream,
            content_length,
        })
    }
}
