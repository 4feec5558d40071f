//! Typed inbound webhook payloads
//!
//! The provider posts form-encoded bodies; fields beyond `From` are optional
//! and default softly so a sparse payload never fails parsing outright.

use serde::Deserialize;

use wa_core::{MediaRef, Sender};

use crate::error::{Result, TwilioError};

/// Inbound reply-webhook form
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyForm {
    /// Sender phone identifier (`whatsapp:+...`)
    #[serde(rename = "From")]
    pub from: String,

    /// Sender profile name, when shared
    #[serde(rename = "ProfileName", default)]
    pub profile_name: Option<String>,

    /// Text body; voice notes and images may arrive without one
    #[serde(rename = "Body", default)]
    pub body: Option<String>,

    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<u32>,

    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,

    #[serde(rename = "MediaContentType0", default)]
    pub media_content_type: Option<String>,

    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
}

impl ReplyForm {
    /// Parse a raw form-encoded body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_urlencoded::from_bytes(bytes)
            .map_err(|e| TwilioError::InvalidPayload(e.to_string()))
    }

    /// Build the sender identity; a missing profile name falls back to the
    /// phone identifier.
    pub fn sender(&self) -> Sender {
        Sender::new(self.from.clone(), self.profile_name.as_deref())
    }

    /// Text content, empty when absent
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// Attached media, when the payload carries one
    pub fn media(&self) -> Option<MediaRef> {
        if self.num_media.unwrap_or(0) == 0 {
            return None;
        }
        let url = self.media_url.clone()?;
        let content_type = self
            .media_content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Some(MediaRef { url, content_type })
    }
}

/// Delivery-status callback form; acknowledged and otherwise ignored
#[derive(Debug, Clone, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,

    #[serde(rename = "MessageStatus", default)]
    pub message_status: Option<String>,
}

impl StatusForm {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_urlencoded::from_bytes(bytes)
            .map_err(|e| TwilioError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_message() {
        let body = b"From=whatsapp%3A%2B1234567890&ProfileName=Test+User&Body=Hello%2C+WhatsApp+bot%21";
        let form = ReplyForm::from_bytes(body).unwrap();

        assert_eq!(form.from, "whatsapp:+1234567890");
        assert_eq!(form.text(), "Hello, WhatsApp bot!");
        assert!(form.media().is_none());

        let sender = form.sender();
        assert_eq!(sender.display_name, "Test User");
        assert_eq!(sender.phone_number, "whatsapp:+1234567890");
    }

    #[test]
    fn test_missing_body_yields_empty_text() {
        let body = b"From=whatsapp%3A%2B1234567890";
        let form = ReplyForm::from_bytes(body).unwrap();
        assert_eq!(form.text(), "");
        assert!(form.body.is_none());
    }

    #[test]
    fn test_missing_from_is_rejected() {
        let body = b"Body=hello";
        assert!(ReplyForm::from_bytes(body).is_err());
    }

    #[test]
    fn test_parse_voice_note() {
        let body = b"From=whatsapp%3A%2B1234567890&NumMedia=1\
            &MediaUrl0=https%3A%2F%2Fapi.twilio.com%2Fmedia%2FME123\
            &MediaContentType0=audio%2Fogg";
        let form = ReplyForm::from_bytes(body).unwrap();

        let media = form.media().unwrap();
        assert_eq!(media.url, "https://api.twilio.com/media/ME123");
        assert_eq!(media.content_type, "audio/ogg");
        assert_eq!(form.text(), "");
    }

    #[test]
    fn test_num_media_zero_means_no_media() {
        let body = b"From=whatsapp%3A%2B1234567890&Body=hi&NumMedia=0";
        let form = ReplyForm::from_bytes(body).unwrap();
        assert!(form.media().is_none());
    }

    #[test]
    fn test_status_form_parses_leniently() {
        let form = StatusForm::from_bytes(b"MessageSid=SM123&MessageStatus=delivered").unwrap();
        assert_eq!(form.message_status.as_deref(), Some("delivered"));

        let form = StatusForm::from_bytes(b"Unrelated=value").unwrap();
        assert!(form.message_sid.is_none());
    }
}
