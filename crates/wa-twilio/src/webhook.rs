//! Webhook server for receiving WhatsApp messages from Twilio
//!
//! The reply handler runs the whole conversation pipeline; the provider only
//! ever sees a success acknowledgment, and failures are reported to the user
//! through the chat channel itself.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{RawForm, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use wa_core::config::DEFAULT_APOLOGY_MESSAGE;
use wa_core::{ChatMessage, Config, OpenAiClient, SessionManager};
use wa_voice::WhisperClient;

use crate::client::TwilioClient;
use crate::directive::{image_directive_marker, split_image_directive};
use crate::error::{Result, TwilioError};
use crate::media;
use crate::payload::{ReplyForm, StatusForm};

/// Messages that close a conversation instead of prompting a reply
const GOODBYE_SIGNALS: &[&str] = &["bye", "bye bye", "goodbye", "see you", "see ya", "farewell"];

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub twilio: Arc<TwilioClient>,
    pub openai: Arc<OpenAiClient>,
    pub whisper: Arc<WhisperClient>,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<Config>,
}

/// Webhook server
pub struct WebhookServer {
    addr: SocketAddr,
    state: WebhookState,
}

impl WebhookServer {
    /// Create a new webhook server
    pub fn new(addr: SocketAddr, state: WebhookState) -> Self {
        Self { addr, state }
    }

    /// Start the webhook server
    pub async fn start(self) -> Result<()> {
        info!("Starting WhatsApp webhook server on {}", self.addr);

        let app = Router::new()
            .route("/whatsapp/reply", post(handle_reply))
            .route("/whatsapp/status", post(handle_status))
            .with_state(Arc::new(self.state));

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| TwilioError::Config(e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| TwilioError::Http(e.to_string()))?;

        Ok(())
    }
}

fn ok_ack() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Handle an incoming WhatsApp message
async fn handle_reply(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    if state.config.twilio.validate_signature {
        let signature = headers
            .get("X-Twilio-Signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let payload = String::from_utf8_lossy(&body);

        if !state.twilio.verify_signature(&payload, signature) {
            warn!("Webhook signature verification failed");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let form = match ReplyForm::from_bytes(&body) {
        Ok(form) => form,
        Err(e) => {
            warn!("Ignoring malformed webhook payload: {}", e);
            return ok_ack().into_response();
        }
    };

    info!("Received WhatsApp message from {}", form.from);

    // Failures are already signaled to the user inside the pipeline; the
    // provider still gets its acknowledgment.
    if let Err(e) = process_reply(&state, form).await {
        error!("Error processing message: {}", e);
    }

    ok_ack().into_response()
}

/// Handle a delivery-status callback: acknowledge unconditionally, no
/// processing, no state mutation.
async fn handle_status(RawForm(body): RawForm) -> Json<serde_json::Value> {
    match StatusForm::from_bytes(&body) {
        Ok(status) => debug!(
            "Delivery status {:?} for {:?}",
            status.message_status, status.message_sid
        ),
        Err(e) => debug!("Unparsed status callback: {}", e),
    }
    ok_ack()
}

/// Run one inbound message through the conversation pipeline
async fn process_reply(state: &WebhookState, form: ReplyForm) -> Result<()> {
    let sender = form.sender();

    // Serialize the whole read-modify-write cycle per sender; independent
    // senders proceed concurrently.
    let lock = state.sessions.sender_lock(&sender.phone_number);
    let _guard = lock.lock().await;

    let template = &state.config.chat.start_template;
    let mut session = state
        .sessions
        .get_or_create(&sender, template)
        .await
        .map_err(|e| TwilioError::Session(e.to_string()))?;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    session.refresh_system_prompt(template, &today);

    let text = media::resolve_text(
        &form,
        &state.twilio,
        &state.whisper,
        state.config.chat.voice_transcription,
    )
    .await;

    // Short-circuits leave no trace in the session history.
    if text.trim().is_empty() {
        debug!("Empty message from {}, sending apology", sender.phone_number);
        state
            .twilio
            .send_message(&sender.phone_number, DEFAULT_APOLOGY_MESSAGE)
            .await?;
        return Ok(());
    }

    if is_goodbye(&text) {
        let goodbye = state
            .config
            .chat
            .goodbye_message
            .replace("{user}", &sender.display_name);
        state
            .twilio
            .send_message(&sender.phone_number, &goodbye)
            .await?;
        return Ok(());
    }

    // First real turn: pin the conversation language before replying.
    if session.is_first_turn() {
        match state.openai.detect_language(&text).await {
            Ok(language) => {
                info!("Detected language for {}: {}", sender.phone_number, language);
                session.language = Some(language);
                session.refresh_system_prompt(template, &today);
            }
            Err(e) => warn!("Language detection failed: {}", e),
        }
    }

    let mut user_message = ChatMessage::user(text);
    if let Some(media) = form.media() {
        user_message = user_message.with_media(media);
    }
    session.add_message(user_message);

    let reply = match state.openai.chat_completion(&session.messages).await {
        Ok(reply) => reply,
        Err(e) => {
            // No reply can be produced; apologize instead of going silent,
            // and keep this turn out of the persisted history.
            error!("Completion failed: {}", e);
            state
                .twilio
                .send_message(&sender.phone_number, DEFAULT_APOLOGY_MESSAGE)
                .await?;
            return Ok(());
        }
    };
    info!("Generated reply of length {}", reply.len());

    let (visible, image_prompt) = split_image_directive(&reply);

    if visible.is_empty() {
        debug!("Reply is directive-only, skipping text delivery");
    } else {
        state
            .twilio
            .send_message_with_fallback(
                &sender.phone_number,
                &visible,
                Some(DEFAULT_APOLOGY_MESSAGE),
            )
            .await?;
    }

    // The delivered text, not the raw reply, goes into history.
    session.add_message(ChatMessage::assistant(visible));

    if let Some(prompt) = image_prompt {
        if state.config.chat.allow_images {
            session.add_message(ChatMessage::system(image_directive_marker(&prompt)));
            send_generated_image(state, &sender.phone_number, &prompt).await;
        }
    }

    state
        .sessions
        .save(&session)
        .await
        .map_err(|e| TwilioError::Session(e.to_string()))?;
    debug!("Conversation:\n{}", session.conversation());

    Ok(())
}

/// Render and deliver the requested image. The text reply has already gone
/// out, so failures here only log.
async fn send_generated_image(state: &WebhookState, to: &str, prompt: &str) {
    match state.openai.generate_image(prompt).await {
        Ok(url) => {
            if let Err(e) = state.twilio.send_media_message(to, "", &url).await {
                error!("Failed to deliver generated image: {}", e);
            }
        }
        Err(e) => error!("Image generation failed: {}", e),
    }
}

/// Check whether a message signals the end of the conversation
fn is_goodbye(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    GOODBYE_SIGNALS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_goodbye() {
        assert!(is_goodbye("bye"));
        assert!(is_goodbye("Goodbye!"));
        assert!(is_goodbye("  See you  "));
        assert!(is_goodbye("BYE BYE"));
        assert!(!is_goodbye("goodbye my friend"));
        assert!(!is_goodbye("hello"));
        assert!(!is_goodbye(""));
    }

    #[test]
    fn test_goodbye_message_formatting() {
        let formatted =
            wa_core::config::DEFAULT_GOODBYE_MESSAGE.replace("{user}", "Alice");
        assert_eq!(formatted, "Goodbye, Alice! I'll be here if you need me.");
    }

    #[test]
    fn test_ok_ack_shape() {
        let Json(value) = ok_ack();
        assert_eq!(value, json!({"status": "ok"}));
    }

    /// First contact walks the session through the same states the pipeline
    /// does: one system message, user turn, assistant turn, three persisted.
    #[tokio::test]
    async fn test_first_contact_conversation_shape() {
        use wa_core::{Role, Sender, SessionManager};

        let manager = SessionManager::in_memory().unwrap();
        let sender = Sender::new("+1234567890", Some("Test User"));
        let template = "You are helping {user}. Today is {today}.";

        let mut session = manager.get_or_create(&sender, template).await.unwrap();
        assert_eq!(session.messages.len(), 1);

        session.refresh_system_prompt(template, "2026-08-06");
        assert!(session.is_first_turn());
        assert!(session.messages[0].content.contains("Test User"));
        assert!(session.messages[0].content.contains("2026-08-06"));

        session.add_message(ChatMessage::user("Hello"));
        // The completion sees system + user
        assert_eq!(session.messages.len(), 2);

        session.add_message(ChatMessage::assistant("Hi Test User!"));
        manager.save(&session).await.unwrap();

        let persisted = manager.get_or_create(&sender, template).await.unwrap();
        assert_eq!(persisted.messages.len(), 3);
        assert_eq!(persisted.messages[0].role, Role::System);
        assert_eq!(persisted.messages[1].role, Role::User);
        assert_eq!(persisted.messages[2].role, Role::Assistant);
    }
}
