//! wa-voice: voice note transcription via the Whisper API

pub mod error;
pub mod whisper;

pub use error::{Result, VoiceError};
pub use whisper::{WhisperClient, WhisperConfig};
