//! Error types for Cadence.

use thiserror::Error;

/// Result type alias using Cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence.
#[derive(Error, Debug)]
pub enum Error {
    // Input validation
    #[error("Invalid input: {0}")]
    Validation(String),

    // Missing stream, element or output device
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    // Command transport between the UI layer and the player host
    #[error("Transport error: {0}")]
    Transport(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out-of-range or inverted input. State was left unchanged.
    Validation,
    /// No underlying stream, element or device to act on.
    Unavailable,
    /// The command channel to the controlled stream failed.
    TransientIo,
    /// Anything else.
    Internal,
}

impl Error {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Unavailable(_) | Self::AudioOutput(_) | Self::AudioDecode(_) => {
                ErrorKind::Unavailable
            }
            Self::Transport(_) | Self::Io(_) | Self::Json(_) => ErrorKind::TransientIo,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Nothing retries automatically; callers with their own periodic
    /// re-sync may use this to decide whether to try again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientIo)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Transport("pipe closed".into()).is_retryable());
        assert!(!Error::Validation("start >= end".into()).is_retryable());
        assert!(!Error::Unavailable("no element".into()).is_retryable());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::AudioOutput("no device".into()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = Error::unavailable("No video element");
        assert_eq!(err.to_string(), "Resource unavailable: No video element");
    }
}
