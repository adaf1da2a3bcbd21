//! Session de streaming : source d'octets ordonnée pour un seul morceau
//!
//! Une session appartient à une seule requête. La supprimer ferme la
//! connexion sous-jacente, sans la vider.

use crate::error::Result;
use crate::models::{Encoding, Provider};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Flux d'octets déjà déchiffrés
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub struct StreamSession {
    provider: Provider,
    track_id: String,
    encoding: Encoding,
    content_length: Option<u64>,
    inner: ByteStream,
    /// Reste d'un morceau découpé par [`StreamSession::fill`]
    pending: Option<Bytes>,
    bytes_read: u64,
}

impl StreamSession {
    pub fn new(
        provider: Provider,
        track_id: impl Into<String>,
        encoding: Encoding,
        inner: ByteStream,
    ) -> Self {
        let track_id = track_id.into();
        debug!(%provider, track_id = %track_id, format = %encoding.format, "stream session opened");
        Self {
            provider,
            track_id,
            encoding,
            content_length: None,
            inner,
            pending: None,
            bytes_read: 0,
        }
    }

    /// Taille totale des octets produits par la session, si le fournisseur la connaît
    ///
    /// Ne pas la renseigner quand le déchiffrement change la longueur.
    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Complète `buf` jusqu'à `target` octets
    ///
    /// Retourne `false` si la source se termine avant. Les octets lus en trop
    /// sont rendus par le prochain appel à `next`.
    pub async fn fill(&mut self, buf: &mut Vec<u8>, target: usize) -> Result<bool> {
        while buf.len() < target {
            let Some(chunk) = self.next().await.transpose()? else {
                return Ok(false);
            };
            let missing = target - buf.len();
            if chunk.len() > missing {
                buf.extend_from_slice(&chunk[..missing]);
                self.pending = Some(chunk.slice(missing..));
            } else {
                buf.extend_from_slice(&chunk);
            }
        }
        Ok(true)
    }

    /// Lit tout le reste de la session
    pub async fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(())
    }
}

impl Stream for StreamSession {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(pending) = this.pending.take() {
            return Poll::Ready(Some(Ok(pending)));
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_read += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        debug!(
            provider = %self.provider,
            track_id = %self.track_id,
            bytes = self.bytes_read,
            "stream session closed"
        );
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("provider", &self.provider)
            .field("track_id", &self.track_id)
            .field("encoding", &self.encoding)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

/// Session construite sur des morceaux en mémoire
pub fn from_chunks(
    provider: Provider,
    track_id: &str,
    encoding: Encoding,
    chunks: Vec<Result<Bytes>>,
) -> StreamSession {
    StreamSession::new(provider, track_id, encoding, futures::stream::iter(chunks).boxed())
}
