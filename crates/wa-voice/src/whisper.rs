//! Speech recognition using the OpenAI Whisper API

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, VoiceError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the Whisper client
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// API key
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Model to use (e.g., "whisper-1")
    pub model: String,
    /// Language hint (ISO 639-1 code, e.g., "en", "es")
    pub language: Option<String>,
}

impl WhisperConfig {
    /// Create a configuration for the OpenAI endpoint
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "whisper-1".to_string(),
            language: None,
        }
    }

    /// Point at a custom OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set a language hint
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper client for voice note transcription
pub struct WhisperClient {
    client: Client,
    config: WhisperConfig,
}

impl WhisperClient {
    /// Create a new Whisper client
    pub fn new(config: WhisperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| VoiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Transcribe an audio attachment to text
    pub async fn transcribe(
        &self,
        audio_data: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.config.base_url);

        info!(
            "Transcribing audio: {} bytes, content type {}",
            audio_data.len(),
            content_type
        );
        debug!("Using model {}", self.config.model);

        let part = reqwest::multipart::Part::bytes(audio_data)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| VoiceError::InvalidFormat(format!("{}: {}", content_type, e)))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.config.model.clone())
            .part("file", part);

        if let Some(ref lang) = self.config.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VoiceError::TranscriptionFailed(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            VoiceError::TranscriptionFailed(format!("Failed to parse response: {}", e))
        })?;

        info!("Transcription complete: {} characters", result.text.len());

        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_config_openai() {
        let config = WhisperConfig::openai("test-key");
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.language.is_none());
    }

    #[test]
    fn test_whisper_config_with_options() {
        let config = WhisperConfig::openai("test-key")
            .with_base_url("https://stt.internal/v1")
            .with_language("es");

        assert_eq!(config.base_url, "https://stt.internal/v1");
        assert_eq!(config.language, Some("es".to_string()));
    }

    #[test]
    fn test_client_creation() {
        let client = WhisperClient::new(WhisperConfig::openai("test-key"));
        assert!(client.is_ok());
    }
}
