//! Error types for wa-twilio

use thiserror::Error;

/// wa-twilio error type
#[derive(Error, Debug)]
pub enum TwilioError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Media processing failed: {0}")]
    Media(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TwilioError {
    fn from(err: reqwest::Error) -> Self {
        TwilioError::Http(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TwilioError>;
