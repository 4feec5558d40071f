//! Twilio API client for WhatsApp

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, TwilioError};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Twilio API client
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    whatsapp_number: String,
    base_url: String,
}

/// Outgoing message payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessagePayload {
    from: String,
    to: String,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<String>,
}

/// Prefix a phone identifier with the WhatsApp address scheme when it does
/// not carry one already (inbound `From` values arrive pre-prefixed).
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

impl TwilioClient {
    /// Create a new Twilio client
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        whatsapp_number: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TwilioError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            whatsapp_number: whatsapp_number.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Send a WhatsApp message, returning the provider message sid
    pub async fn send_message(&self, to: &str, body: &str) -> Result<String> {
        self.send(to, body, None).await
    }

    /// Send a WhatsApp message with an attached media URL
    pub async fn send_media_message(
        &self,
        to: &str,
        body: &str,
        media_url: &str,
    ) -> Result<String> {
        self.send(to, body, Some(media_url.to_string())).await
    }

    /// Send a message; on delivery failure, send `on_failure` instead when
    /// provided, otherwise surface the error to the caller.
    pub async fn send_message_with_fallback(
        &self,
        to: &str,
        body: &str,
        on_failure: Option<&str>,
    ) -> Result<String> {
        match self.send_message(to, body).await {
            Ok(sid) => Ok(sid),
            Err(e) => match on_failure {
                Some(fallback) => {
                    warn!("Delivery failed ({}), sending fallback text", e);
                    self.send_message(to, fallback).await
                }
                None => Err(e),
            },
        }
    }

    async fn send(&self, to: &str, body: &str, media_url: Option<String>) -> Result<String> {
        info!("Sending WhatsApp message to {}", to);

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let payload = SendMessagePayload {
            from: whatsapp_address(&self.whatsapp_number),
            to: whatsapp_address(to),
            body: body.to_string(),
            media_url,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TwilioError::Delivery(format!(
                "Failed to send message: {} - {}",
                status, text
            )));
        }

        #[derive(serde::Deserialize)]
        struct SendMessageResponse {
            sid: String,
        }

        let result: SendMessageResponse = response.json().await?;
        Ok(result.sid)
    }

    /// Download a Twilio-hosted media attachment (voice notes)
    pub async fn fetch_media(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TwilioError::Http(format!(
                "Failed to fetch media: {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Verify a webhook signature against the raw form body
    pub fn verify_signature(&self, payload: &str, signature: &str) -> bool {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = match HmacSha256::new_from_slice(self.auth_token.as_bytes()) {
            Ok(m) => m,
            Err(_) => return false,
        };

        mac.update(payload.as_bytes());

        let expected = mac.finalize().into_bytes();
        let expected_hex = hex::encode(expected);

        expected_hex == signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TwilioClient::new("AC123", "token123", "+14155238886").unwrap();
        assert_eq!(client.account_sid, "AC123");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_whatsapp_address() {
        assert_eq!(whatsapp_address("+1234567890"), "whatsapp:+1234567890");
        assert_eq!(whatsapp_address("whatsapp:+1234567890"), "whatsapp:+1234567890");
    }

    #[test]
    fn test_payload_uses_provider_field_names() {
        let payload = SendMessagePayload {
            from: "whatsapp:+14155238886".to_string(),
            to: "whatsapp:+1234567890".to_string(),
            body: "hi".to_string(),
            media_url: None,
        };
        let encoded = serde_urlencoded::to_string(&payload).unwrap();
        assert!(encoded.contains("From=") && encoded.contains("To=") && encoded.contains("Body="));
        assert!(!encoded.contains("MediaUrl"));
    }

    #[test]
    fn test_verify_signature() {
        let client = TwilioClient::new("AC123", "token123", "+14155238886").unwrap();
        let payload = "From=whatsapp%3A%2B1234567890&Body=Hello";

        // Signature computed with the same token matches
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"token123").unwrap();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(client.verify_signature(payload, &signature));
        assert!(!client.verify_signature(payload, "deadbeef"));
    }
}
