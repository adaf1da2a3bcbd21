//! États d'une requête de streaming
//!
//! `Resolving → Negotiating → Sniffing → Injecting|Buffering → Relaying → Done`,
//! avec `Failed(kind)` atteignable depuis n'importe quelle étape.

use lavasource::{ErrorKind, Provider, Stage, StreamError};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Resolving,
    Negotiating,
    Sniffing,
    Injecting,
    Buffering,
    Relaying,
    Done,
    Failed(ErrorKind),
}

impl PipelineState {
    /// Étape en cours, `None` pour les états terminaux
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Resolving => Some(Stage::Resolving),
            PipelineState::Negotiating => Some(Stage::Negotiating),
            PipelineState::Sniffing => Some(Stage::Sniffing),
            PipelineState::Injecting => Some(Stage::Injecting),
            PipelineState::Buffering => Some(Stage::Buffering),
            PipelineState::Relaying => Some(Stage::Relaying),
            PipelineState::Done | PipelineState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Resolving => PipelineState::Resolving,
            Stage::Negotiating => PipelineState::Negotiating,
            Stage::Sniffing => PipelineState::Sniffing,
            Stage::Injecting => PipelineState::Injecting,
            Stage::Buffering => PipelineState::Buffering,
            Stage::Relaying => PipelineState::Relaying,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(kind) => write!(f, "failed({})", kind),
            other => match other.stage() {
                Some(stage) => write!(f, "{}", stage),
                None => Ok(()),
            },
        }
    }
}

/// Suivi des transitions d'une requête
#[derive(Debug, Clone)]
pub struct Progress {
    provider: Provider,
    track_id: String,
    history: Vec<PipelineState>,
}

impl Progress {
    pub fn new(provider: Provider, track_id: impl Into<String>) -> Self {
        Self {
            provider,
            track_id: track_id.into(),
            history: Vec::new(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// État courant ; `Resolving` avant la première transition
    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Resolving)
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        debug!(
            provider = %self.provider,
            track_id = %self.track_id,
            stage = %stage,
            "pipeline transition"
        );
        self.history.push(stage.into());
    }

    /// Passe en `Failed` et complète le contexte de l'erreur
    pub(crate) fn fail(&mut self, err: StreamError) -> StreamError {
        let stage = self.state().stage().unwrap_or(Stage::Relaying);
        let err = err.with_context(self.provider, &self.track_id, stage);
        warn!(
            provider = %self.provider,
            track_id = %self.track_id,
            stage = %stage,
            kind = %err.kind(),
            "pipeline failed: {}",
            err.message()
        );
        self.history.push(PipelineState::Failed(err.kind()));
        err
    }

    pub(crate) fn done(&mut self, bytes: u64) {
        info!(
            provider = %self.provider,
            track_id = %self.track_id,
            bytes,
            "stream relayed"
        );
        self.history.push(PipelineState::Done);
    }
}
