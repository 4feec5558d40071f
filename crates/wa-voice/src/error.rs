//! Error types for wa-voice

use thiserror::Error;

/// wa-voice error type
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, VoiceError>;
