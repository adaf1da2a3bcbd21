//! Pipeline de streaming
//!
//! Une requête `/listen` traverse les étapes suivantes :
//!
//! 1. **Resolving** : validation de l'identifiant et métadonnées du morceau ;
//! 2. **Negotiating** : choix de l'encodage selon la politique ;
//! 3. **Sniffing** : ouverture de la session et lecture de la fenêtre de tête ;
//! 4. **Injecting** (fenêtre réécrite) ou **Buffering** (fichier complet
//!    chargé puis tagué) ;
//! 5. **Relaying** : voir [`crate::relay`].
//!
//! Un échec d'injection n'interrompt jamais la requête : les octets
//! d'origine sont relayés tels quels.

use crate::relay::Relay;
use crate::state::{PipelineState, Progress};
use bytes::Bytes;
use lavamedia::{AudioFormat, MAX_HEADER_WINDOW, TrackTags, classify, inject, inject_buffered};
use lavasource::{
    Adapter, CatalogKind, Encoding, MediaKind, ProviderAdapter, QualityPolicy, Result, Stage,
    StreamError, StreamSession, Track, select,
};
use tracing::{debug, info, warn};

/// Flux prêt à être relayé : en-tête réécrit et reste de la session
pub struct PreparedStream {
    track: Track,
    encoding: Encoding,
    format: AudioFormat,
    head: Bytes,
    session: Option<StreamSession>,
    content_length: Option<u64>,
    progress: Progress,
}

impl PreparedStream {
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Encodage effectivement servi par le fournisseur
    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Conteneur détecté sur la fenêtre de tête
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn filename(&self) -> String {
        self.track.filename(self.format.extension())
    }

    /// Taille exacte du corps, connue seulement après mise en mémoire complète
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn state(&self) -> PipelineState {
        self.progress.state()
    }

    pub fn history(&self) -> &[PipelineState] {
        self.progress.history()
    }

    /// Passe en `Relaying`
    pub fn into_relay(self, chunk_size: usize) -> Relay {
        let mut progress = self.progress;
        progress.enter(Stage::Relaying);
        Relay::new(self.head, self.session, chunk_size, progress)
    }
}

/// Exécution du pipeline pour un morceau
pub struct StreamPipeline<'a> {
    adapter: &'a Adapter,
    policy: QualityPolicy,
    chunk_size: usize,
    kind: MediaKind,
}

impl<'a> StreamPipeline<'a> {
    pub fn new(adapter: &'a Adapter, policy: QualityPolicy, chunk_size: usize) -> Self {
        Self {
            adapter,
            policy,
            chunk_size,
            kind: MediaKind::Track,
        }
    }

    /// Les identifiants désignent des épisodes de podcast
    pub fn episodes(mut self) -> Self {
        self.kind = MediaKind::Episode;
        self
    }

    /// Étape Resolving seule, utilisée par la route de métadonnées
    pub async fn resolve(&self, track_id: &str) -> Result<Track> {
        let mut progress = Progress::new(self.adapter.provider(), track_id);
        self.resolve_with(&mut progress, track_id)
            .await
            .map_err(|e| progress.fail(e))
    }

    async fn resolve_with(&self, progress: &mut Progress, track_id: &str) -> Result<Track> {
        progress.enter(Stage::Resolving);
        match self.kind {
            MediaKind::Track => {
                self.adapter.validate_track_id(track_id)?;
                self.adapter.fetch_track_metadata(track_id).await
            }
            MediaKind::Episode => {
                self.adapter
                    .validate_catalog_id(CatalogKind::Episode, track_id)?;
                self.adapter.fetch_episode_metadata(track_id).await
            }
        }
    }

    /// Exécute les étapes jusqu'au relais
    pub async fn prepare(&self, track_id: &str) -> Result<PreparedStream> {
        let mut progress = Progress::new(self.adapter.provider(), track_id);
        match self.run(&mut progress, track_id).await {
            Ok(parts) => Ok(PreparedStream {
                track: parts.track,
                encoding: parts.encoding,
                format: parts.format,
                head: Bytes::from(parts.head),
                session: parts.session,
                content_length: parts.content_length,
                progress,
            }),
            Err(e) => Err(progress.fail(e)),
        }
    }

    async fn run(&self, progress: &mut Progress, track_id: &str) -> Result<Parts> {
        let track = self.resolve_with(progress, track_id).await?;

        progress.enter(Stage::Negotiating);
        let chosen = select(&track.encodings, &self.policy)?;
        info!(
            provider = %track.provider,
            track_id = %track.id,
            format = %chosen.format,
            quality = %chosen.quality,
            "encoding selected"
        );

        progress.enter(Stage::Sniffing);
        let mut session = self.adapter.open_stream(&track, &chosen).await?;
        let encoding = session.encoding().clone();
        let mut window = Vec::with_capacity(self.chunk_size);
        let more = session.fill(&mut window, self.chunk_size).await?;
        let format = classify(&window);
        if format == AudioFormat::Unknown {
            return Err(StreamError::unsupported_format(format!(
                "unrecognised container in the first {} bytes",
                window.len()
            )));
        }
        if format != encoding.format {
            debug!(expected = %encoding.format, detected = %format, "container differs from the announced encoding");
        }

        let tags = track.tags();
        if format.requires_full_buffer() {
            progress.enter(Stage::Buffering);
            session.read_to_end(&mut window).await?;
            drop(session);
            let bytes = match inject_buffered(&window, format, &tags) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = StreamError::from(e).with_context(
                        track.provider,
                        &track.id,
                        Stage::Buffering,
                    );
                    warn!(kind = %err.kind(), "relaying untagged file: {}", err);
                    window
                }
            };
            debug!(format = %format, bytes = bytes.len(), "buffered file tagged");
            return Ok(Parts {
                content_length: Some(bytes.len() as u64),
                head: bytes,
                session: None,
                track,
                encoding,
                format,
            });
        }

        progress.enter(Stage::Injecting);
        let (head, consumed) = self
            .inject_window(&mut session, window, more, format, &tags)
            .await?;
        // La queue de la session est relayée telle quelle : seule la tête change de taille.
        let content_length = session
            .content_length()
            .and_then(|total| total.checked_sub(consumed as u64))
            .map(|rest| head.len() as u64 + rest);
        Ok(Parts {
            track,
            encoding,
            format,
            head,
            session: Some(session),
            content_length,
        })
    }

    /// Réécrit la fenêtre de tête, en l'élargissant tant que l'en-tête du
    /// conteneur n'y tient pas (jusqu'à [`MAX_HEADER_WINDOW`])
    ///
    /// Retourne la tête à émettre et le nombre d'octets source qu'elle remplace.
    async fn inject_window(
        &self,
        session: &mut StreamSession,
        mut window: Vec<u8>,
        mut more: bool,
        format: AudioFormat,
        tags: &TrackTags,
    ) -> Result<(Vec<u8>, usize)> {
        loop {
            match inject(&window, format, tags) {
                Ok(injected) => return Ok((injected.bytes, window.len())),
                Err(e) if e.is_incomplete() && more && window.len() < MAX_HEADER_WINDOW => {
                    let target = (window.len() * 2).min(MAX_HEADER_WINDOW);
                    debug!(format = %format, from = window.len(), to = target, "widening header window");
                    more = session.fill(&mut window, target).await?;
                }
                Err(e) => {
                    let err = StreamError::from(e).with_context(
                        session.provider(),
                        session.track_id(),
                        Stage::Injecting,
                    );
                    warn!(kind = %err.kind(), "relaying original bytes: {}", err);
                    let consumed = window.len();
                    return Ok((window, consumed));
                }
            }
        }
    }
}

struct Parts {
    track: Track,
    encoding: Encoding,
    format: AudioFormat,
    head: Vec<u8>,
    session: Option<StreamSession>,
    content_length: Option<u64>,
}
