//! Relais du flux vers le client
//!
//! L'en-tête réécrit puis le reste de la session sont redécoupés en
//! morceaux de `chunk_size` octets. La fin de la source termine le corps
//! proprement ; une erreur en cours de relais est rendue au client sous
//! forme d'erreur d'E/S, ce qui interrompt le corps HTTP (les octets déjà
//! envoyés ne sont pas repris).
//!
//! Supprimer le flux supprime la session : une déconnexion du client ferme
//! donc la connexion amont sans la vider.

use crate::state::{PipelineState, Progress};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use lavasource::{StreamError, StreamSession};
use std::io;

pub struct Relay {
    buffer: BytesMut,
    session: Option<StreamSession>,
    chunk_size: usize,
    progress: Progress,
    error: Option<StreamError>,
    sent: u64,
    finished: bool,
}

impl Relay {
    pub(crate) fn new(
        head: Bytes,
        session: Option<StreamSession>,
        chunk_size: usize,
        progress: Progress,
    ) -> Self {
        let mut buffer = BytesMut::with_capacity(head.len().max(chunk_size));
        buffer.extend_from_slice(&head);
        Self {
            buffer,
            session,
            chunk_size: chunk_size.max(1),
            progress,
            error: None,
            sent: 0,
            finished: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.progress.state()
    }

    /// Prochain morceau ; `None` en fin de flux
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        loop {
            if self.buffer.len() >= self.chunk_size {
                return Some(Ok(self.emit(self.chunk_size)));
            }

            if self.session.is_none() {
                if !self.buffer.is_empty() {
                    let len = self.buffer.len();
                    return Some(Ok(self.emit(len)));
                }
                if self.finished {
                    return None;
                }
                self.finished = true;
                return match self.error.take() {
                    Some(err) => {
                        let err = self.progress.fail(err);
                        Some(Err(io::Error::other(err)))
                    }
                    None => {
                        self.progress.done(self.sent);
                        None
                    }
                };
            }

            let next = match self.session.as_mut() {
                Some(session) => session.next().await,
                None => None,
            };
            match next {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    // Les octets déjà lus partent avant l'erreur
                    self.error = Some(err);
                    self.session = None;
                }
                None => self.session = None,
            }
        }
    }

    fn emit(&mut self, len: usize) -> Bytes {
        self.sent += len as u64;
        self.buffer.split_to(len).freeze()
    }

    /// Corps HTTP
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut relay| async move {
            relay.next_chunk().await.map(|chunk| (chunk, relay))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lavamedia::AudioFormat;
    use lavasource::{Encoding, ErrorKind, Provider, QualityTier, Result, Stage};

    fn session(chunks: Vec<Result<Bytes>>) -> StreamSession {
        lavasource::session::from_chunks(
            Provider::Spotify,
            "track",
            Encoding::new(AudioFormat::Mp3, QualityTier::High, "MP3_160"),
            chunks,
        )
    }

    fn relay(head: &[u8], chunks: Vec<Result<Bytes>>, chunk_size: usize) -> Relay {
        let mut progress = Progress::new(Provider::Spotify, "track");
        progress.enter(Stage::Relaying);
        Relay::new(
            Bytes::copy_from_slice(head),
            Some(session(chunks)),
            chunk_size,
            progress,
        )
    }

    #[tokio::test]
    async fn test_rechunks_head_and_body() {
        let mut relay = relay(
            &[1; 10],
            vec![Ok(Bytes::from(vec![2; 7])), Ok(Bytes::from(vec![3; 9]))],
            8,
        );
        let mut sizes = Vec::new();
        let mut total = Vec::new();
        while let Some(chunk) = relay.next_chunk().await {
            let chunk = chunk.unwrap();
            sizes.push(chunk.len());
            total.extend_from_slice(&chunk);
        }
        assert_eq!(sizes, vec![8, 8, 8, 2]);
        assert_eq!(total.len(), 26);
        assert_eq!(relay.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn test_truncation_flushes_then_fails() {
        let mut relay = relay(
            b"head",
            vec![
                Ok(Bytes::from_static(b"body")),
                Err(StreamError::upstream("connection reset")),
            ],
            4096,
        );
        let first = relay.next_chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"headbody");
        let err = relay.next_chunk().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(relay.next_chunk().await.is_none());
        assert_eq!(relay.state(), PipelineState::Failed(ErrorKind::Upstream));
    }

    #[tokio::test]
    async fn test_buffered_file_without_session() {
        let mut progress = Progress::new(Provider::Tidal, "1");
        progress.enter(Stage::Relaying);
        let stream = Relay::new(Bytes::from(vec![9; 5000]), None, 4096, progress).into_stream();
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.iter().map(Bytes::len).collect::<Vec<_>>(), vec![4096, 904]);
    }
}
