//! Error types for avatar-voice

use thiserror::Error;

use crate::audio::{DecodeError, PlaybackError};
use crate::voice::SynthesisError;

/// Result type alias for avatar-voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in avatar-voice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio container could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Playback failed
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Speech synthesis failed
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Chat completion error
    #[error("chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
