//! OpenAI API HTTP client
//!
//! Covers the three endpoints the gateway talks to: chat completions,
//! few-shot language detection (through completions), and image generation.

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

use super::types::*;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    sampling: crate::config::SamplingConfig,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .openai
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: config.openai.api_key.clone(),
            base_url,
            sampling: config.openai.sampling.clone(),
        })
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.sampling.model
    }

    /// Send the full conversation to the completions endpoint and return the
    /// first candidate's text, whitespace-trimmed.
    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest::new(&self.sampling, messages);

        debug!("Sending {} messages to {}", messages.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Completion API error: {} - {}", status, body);
            return Err(Error::Completion(format!("{}: {}", status, body)));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Completion(format!("Failed to parse response: {} - {}", e, body)))?;

        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| Error::Completion("No choices in response".to_string()))?;

        let text = choice
            .message
            .content
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();

        info!(
            "Completion API response: finish_reason={:?}, tokens={}",
            choice.finish_reason,
            parsed.usage.map(|u| u.total_tokens).unwrap_or(0)
        );

        Ok(text)
    }

    /// Recognize the language of a text via a few-shot completion.
    ///
    /// The model is prompted to answer with a single word; the answer is
    /// normalized to one lowercase token.
    pub async fn detect_language(&self, text: &str) -> Result<String> {
        let mut prompt = String::from(
            "You are a language recognition program. You can only output a single \
             word saying the language of a given text.",
        );
        prompt.push_str(
            " Some \"text\" -> reply example outputs are: \
             \"Hello world\" -> english, \
             \"Bonjour le monde\" -> french, \
             \"Hola mundo\" -> spanish, \
             \"Hallo Welt\" -> german",
        );
        prompt.push_str(&format!("\n---\n{} ->", text));

        let messages = vec![ChatMessage::system(prompt)];
        let reply = self.chat_completion(&messages).await?;

        normalize_language_reply(&reply)
            .ok_or_else(|| Error::Completion("Empty language detection result".to_string()))
    }

    /// Generate an image and return its URL
    pub async fn generate_image(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/images/generations", self.base_url);
        let request = ImageGenerationRequest {
            prompt: prompt.to_string(),
            n: 1,
            size: "1024x1024".to_string(),
        };

        debug!("Requesting image generation: {}", prompt);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Image API error: {} - {}", status, body);
            return Err(Error::Image(format!("{}: {}", status, body)));
        }

        let parsed: ImageGenerationResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Image(format!("Failed to parse response: {} - {}", e, body)))?;

        parsed
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| Error::Image("No image URL in response".to_string()))
    }
}

/// Normalize a language-detection reply to a single lowercase word.
///
/// Models occasionally echo the few-shot arrow syntax or answer with a short
/// phrase; keep everything before an arrow and take the first word.
fn normalize_language_reply(reply: &str) -> Option<String> {
    let head = reply.split("->").next().unwrap_or_default();
    let word = head
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphabetic())
        .to_lowercase();

    if word.is_empty() { None } else { Some(word) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, OpenAiConfig, SamplingConfig, ServerConfig, SessionConfig, TwilioConfig};

    fn test_config() -> Config {
        Config {
            openai: OpenAiConfig {
                api_key: "sk-test".to_string(),
                base_url: None,
                sampling: SamplingConfig::default(),
            },
            chat: ChatConfig::default(),
            twilio: TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "token".to_string(),
                whatsapp_number: "+14155238886".to_string(),
                validate_signature: false,
            },
            server: ServerConfig::default(),
            session: SessionConfig::default(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = OpenAiClient::new(&test_config()).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.model(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_client_custom_base_url() {
        let mut config = test_config();
        config.openai.base_url = Some("https://llm.internal/v1".to_string());
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://llm.internal/v1");
    }

    #[test]
    fn test_normalize_language_reply() {
        assert_eq!(normalize_language_reply("english"), Some("english".to_string()));
        assert_eq!(normalize_language_reply(" French "), Some("french".to_string()));
        assert_eq!(
            normalize_language_reply("spanish -> some trailing echo"),
            Some("spanish".to_string())
        );
        assert_eq!(
            normalize_language_reply("german language"),
            Some("german".to_string())
        );
        assert_eq!(normalize_language_reply(""), None);
        assert_eq!(normalize_language_reply(" -> "), None);
    }
}
