//! Inbound media processing
//!
//! Voice notes are downloaded from the provider and transcribed; every
//! failure along the way degrades to empty text so the request itself never
//! aborts on a bad attachment.

use mime::Mime;
use tracing::{info, warn};

use wa_core::MediaRef;
use wa_voice::WhisperClient;

use crate::client::TwilioClient;
use crate::error::{Result, TwilioError};
use crate::payload::ReplyForm;

/// Resolve the text content of an inbound message.
///
/// Plain text passes through. An audio attachment replaces the (usually
/// empty) body with its transcription when voice transcription is enabled;
/// other media types fall back to the caption text.
pub async fn resolve_text(
    form: &ReplyForm,
    twilio: &TwilioClient,
    whisper: &WhisperClient,
    voice_transcription: bool,
) -> String {
    let body = form.text().to_string();

    let Some(media) = form.media() else {
        return body;
    };

    if !is_audio(&media.content_type) {
        warn!(
            "Unsupported media type {}, falling back to caption text",
            media.content_type
        );
        return body;
    }

    if !voice_transcription {
        return body;
    }

    match transcribe_voice_note(twilio, whisper, &media).await {
        Ok(text) => {
            info!("Transcribed voice note into {} characters", text.len());
            text
        }
        Err(e) => {
            warn!("Voice note processing failed, treating as empty: {}", e);
            String::new()
        }
    }
}

async fn transcribe_voice_note(
    twilio: &TwilioClient,
    whisper: &WhisperClient,
    media: &MediaRef,
) -> Result<String> {
    let audio = twilio.fetch_media(&media.url).await?;

    whisper
        .transcribe(audio, &audio_filename(&media.content_type), &media.content_type)
        .await
        .map_err(|e| TwilioError::Media(e.to_string()))
}

fn is_audio(content_type: &str) -> bool {
    content_type
        .parse::<Mime>()
        .map(|m| m.type_() == mime::AUDIO)
        .unwrap_or(false)
}

/// The transcription endpoint infers the container from the filename
/// extension, so derive one from the mime subtype.
fn audio_filename(content_type: &str) -> String {
    let subtype = content_type
        .parse::<Mime>()
        .map(|m| m.subtype().as_str().to_string())
        .unwrap_or_else(|_| "bin".to_string());
    format!("voice-note.{}", subtype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wa_voice::WhisperConfig;

    fn test_clients() -> (TwilioClient, WhisperClient) {
        (
            TwilioClient::new("AC123", "token", "+14155238886").unwrap(),
            WhisperClient::new(WhisperConfig::openai("sk-test")).unwrap(),
        )
    }

    #[test]
    fn test_is_audio() {
        assert!(is_audio("audio/ogg"));
        assert!(is_audio("audio/mpeg"));
        assert!(!is_audio("image/jpeg"));
        assert!(!is_audio("not a mime type"));
    }

    #[test]
    fn test_audio_filename() {
        assert_eq!(audio_filename("audio/ogg"), "voice-note.ogg");
        assert_eq!(audio_filename("garbage"), "voice-note.bin");
    }

    #[tokio::test]
    async fn test_text_message_passes_through() {
        let (twilio, whisper) = test_clients();
        let form = ReplyForm::from_bytes(b"From=whatsapp%3A%2B1&Body=hello").unwrap();

        let text = resolve_text(&form, &twilio, &whisper, true).await;
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_non_audio_media_falls_back_to_caption() {
        let (twilio, whisper) = test_clients();
        let form = ReplyForm::from_bytes(
            b"From=whatsapp%3A%2B1&Body=look+at+this&NumMedia=1\
              &MediaUrl0=https%3A%2F%2Fexample.com%2Fpic&MediaContentType0=image%2Fjpeg",
        )
        .unwrap();

        let text = resolve_text(&form, &twilio, &whisper, true).await;
        assert_eq!(text, "look at this");
    }

    #[tokio::test]
    async fn test_voice_note_with_transcription_disabled_uses_body() {
        let (twilio, whisper) = test_clients();
        let form = ReplyForm::from_bytes(
            b"From=whatsapp%3A%2B1&NumMedia=1\
              &MediaUrl0=https%3A%2F%2Fexample.com%2Fvoice&MediaContentType0=audio%2Fogg",
        )
        .unwrap();

        let text = resolve_text(&form, &twilio, &whisper, false).await;
        assert_eq!(text, "");
    }
}
