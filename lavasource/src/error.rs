//! Gestion des erreurs du gateway
//!
//! Toutes les erreurs portent un [`ErrorContext`] (fournisseur, morceau,
//! étape) afin qu'un échec puisse être diagnostiqué sans être reproduit.

use crate::models::Provider;
use lavamedia::InjectError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Type Result personnalisé pour lavasource
pub type Result<T> = std::result::Result<T, StreamError>;

/// Étapes du pipeline de streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolving,
    Negotiating,
    Sniffing,
    Injecting,
    Buffering,
    Relaying,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Negotiating => "negotiating",
            Stage::Sniffing => "sniffing",
            Stage::Injecting => "injecting",
            Stage::Buffering => "buffering",
            Stage::Relaying => "relaying",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Où l'erreur s'est produite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub provider: Option<Provider>,
    pub track_id: Option<String>,
    pub stage: Option<Stage>,
}

impl ErrorContext {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.track_id.is_none() && self.stage.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::with_capacity(3);
        if let Some(provider) = self.provider {
            parts.push(format!("provider={}", provider));
        }
        if let Some(track_id) = &self.track_id {
            parts.push(format!("track={}", track_id));
        }
        if let Some(stage) = self.stage {
            parts.push(format!("stage={}", stage));
        }
        write!(f, " [{}]", parts.join(" "))
    }
}

/// Catégorie d'une [`StreamError`], sans données
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Auth,
    UnsupportedFormat,
    Upstream,
    Decryption,
    MetadataInjection,
    InvalidTrackId,
    ProviderDisabled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Auth => "auth",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Decryption => "decryption",
            ErrorKind::MetadataInjection => "metadata_injection",
            ErrorKind::InvalidTrackId => "invalid_track_id",
            ErrorKind::ProviderDisabled => "provider_disabled",
        };
        f.write_str(name)
    }
}

/// Erreurs possibles lors de la résolution ou du relais d'un morceau
#[derive(Error, Debug)]
pub enum StreamError {
    /// Identifiant inconnu du fournisseur
    #[error("Track not found: {message}{context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Session du fournisseur invalide ou expirée
    #[error("Authentication failed: {message}{context}")]
    Auth {
        message: String,
        context: ErrorContext,
    },

    /// Aucun encodage ne correspond à la politique, ou format non reconnu
    #[error("Unsupported format: {message}{context}")]
    UnsupportedFormat {
        message: String,
        context: ErrorContext,
    },

    /// Échec transitoire du fournisseur ou du réseau
    #[error("Upstream error: {message}{context}")]
    Upstream {
        message: String,
        context: ErrorContext,
    },

    /// Clé ou credential incohérent
    #[error("Decryption failed: {message}{context}")]
    Decryption {
        message: String,
        context: ErrorContext,
    },

    /// Non fatale : le flux est relayé sans tags
    #[error("Metadata injection failed: {message}{context}")]
    MetadataInjection {
        message: String,
        context: ErrorContext,
    },

    /// Identifiant syntaxiquement invalide
    #[error("Invalid track id: {message}{context}")]
    InvalidTrackId {
        message: String,
        context: ErrorContext,
    },

    /// Fournisseur désactivé dans la configuration
    #[error("Provider disabled: {message}{context}")]
    ProviderDisabled {
        message: String,
        context: ErrorContext,
    },
}

macro_rules! constructor {
    ($name:ident, $variant:ident) => {
        pub fn $name(message: impl Into<String>) -> Self {
            StreamError::$variant {
                message: message.into(),
                context: ErrorContext::default(),
            }
        }
    };
}

impl StreamError {
    constructor!(not_found, NotFound);
    constructor!(auth, Auth);
    constructor!(unsupported_format, UnsupportedFormat);
    constructor!(upstream, Upstream);
    constructor!(decryption, Decryption);
    constructor!(metadata_injection, MetadataInjection);
    constructor!(invalid_track_id, InvalidTrackId);
    constructor!(provider_disabled, ProviderDisabled);

    /// Crée une erreur depuis un code de statut HTTP et un message
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::auth(message),
            404 | 410 => Self::not_found(message),
            415 => Self::unsupported_format(message),
            _ => Self::upstream(format!("HTTP {}: {}", code, message.into())),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::NotFound { .. } => ErrorKind::NotFound,
            StreamError::Auth { .. } => ErrorKind::Auth,
            StreamError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            StreamError::Upstream { .. } => ErrorKind::Upstream,
            StreamError::Decryption { .. } => ErrorKind::Decryption,
            StreamError::MetadataInjection { .. } => ErrorKind::MetadataInjection,
            StreamError::InvalidTrackId { .. } => ErrorKind::InvalidTrackId,
            StreamError::ProviderDisabled { .. } => ErrorKind::ProviderDisabled,
        }
    }

    /// Message sans le contexte
    pub fn message(&self) -> &str {
        match self {
            StreamError::NotFound { message, .. }
            | StreamError::Auth { message, .. }
            | StreamError::UnsupportedFormat { message, .. }
            | StreamError::Upstream { message, .. }
            | StreamError::Decryption { message, .. }
            | StreamError::MetadataInjection { message, .. }
            | StreamError::InvalidTrackId { message, .. }
            | StreamError::ProviderDisabled { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            StreamError::NotFound { context, .. }
            | StreamError::Auth { context, .. }
            | StreamError::UnsupportedFormat { context, .. }
            | StreamError::Upstream { context, .. }
            | StreamError::Decryption { context, .. }
            | StreamError::MetadataInjection { context, .. }
            | StreamError::InvalidTrackId { context, .. }
            | StreamError::ProviderDisabled { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            StreamError::NotFound { context, .. }
            | StreamError::Auth { context, .. }
            | StreamError::UnsupportedFormat { context, .. }
            | StreamError::Upstream { context, .. }
            | StreamError::Decryption { context, .. }
            | StreamError::MetadataInjection { context, .. }
            | StreamError::InvalidTrackId { context, .. }
            | StreamError::ProviderDisabled { context, .. } => context,
        }
    }

    /// Complète le contexte ; les champs déjà renseignés sont conservés
    pub fn with_context(mut self, provider: Provider, track_id: &str, stage: Stage) -> Self {
        let context = self.context_mut();
        context.provider.get_or_insert(provider);
        if context.track_id.is_none() {
            context.track_id = Some(track_id.to_string());
        }
        context.stage.get_or_insert(stage);
        self
    }

    /// Renseigne l'étape si elle ne l'est pas encore
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.context_mut().stage.get_or_insert(stage);
        self
    }

    /// Vérifie si l'erreur est une erreur de credentials
    pub fn is_auth_error(&self) -> bool {
        matches!(self, StreamError::Auth { .. })
    }

    /// Le client peut relancer la requête complète
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::Auth { .. } | StreamError::Upstream { .. })
    }

    /// Code HTTP renvoyé au client
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::ProviderDisabled => 404,
            ErrorKind::InvalidTrackId => 400,
            ErrorKind::Auth => 503,
            ErrorKind::UnsupportedFormat => 415,
            ErrorKind::Upstream => 502,
            ErrorKind::Decryption | ErrorKind::MetadataInjection => 500,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status_code(status.as_u16(), err.to_string()),
            None => Self::upstream(err.to_string()),
        }
    }
}

impl From<InjectError> for StreamError {
    fn from(err: InjectError) -> Self {
        Self::metadata_injection(err.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::upstream(err.to_string())
    }
}
