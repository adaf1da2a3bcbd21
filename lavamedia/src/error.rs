use thiserror::Error;

use crate::format::AudioFormat;

/// Failures of header rewriting.
///
/// `Incomplete` is the only recoverable one: the caller may widen the header
/// window and try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectError {
    #[error("{format} headers extend past the {available} bytes available")]
    Incomplete {
        format: AudioFormat,
        available: usize,
    },
    #[error("malformed {format} stream: {reason}")]
    Malformed { format: AudioFormat, reason: String },
    #[error("cannot tag {format} stream: {reason}")]
    Unsupported { format: AudioFormat, reason: String },
    #[error("{format} tags do not fit: {reason}")]
    TooLarge { format: AudioFormat, reason: String },
}

impl InjectError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, InjectError::Incomplete { .. })
    }

    pub fn format(&self) -> AudioFormat {
        match self {
            InjectError::Incomplete { format, .. }
            | InjectError::Malformed { format, .. }
            | InjectError::Unsupported { format, .. }
            | InjectError::TooLarge { format, .. } => *format,
        }
    }
}
