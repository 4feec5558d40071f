//! WhatsApp bot wrapper

use std::net::SocketAddr;
use std::sync::Arc;

use wa_core::{Config, OpenAiClient, SessionManager};
use wa_voice::WhisperClient;

use crate::client::TwilioClient;
use crate::error::Result;
use crate::webhook::{WebhookServer, WebhookState};

/// WhatsApp bot wrapper tying the clients and the webhook server together
pub struct WhatsAppBot {
    state: WebhookState,
    port: u16,
}

impl WhatsAppBot {
    /// Create a new WhatsApp bot from configuration and shared clients
    pub fn new(
        config: Arc<Config>,
        openai: Arc<OpenAiClient>,
        whisper: Arc<WhisperClient>,
        sessions: Arc<SessionManager>,
    ) -> Result<Self> {
        let twilio = Arc::new(TwilioClient::new(
            &config.twilio.account_sid,
            &config.twilio.auth_token,
            &config.twilio.whatsapp_number,
        )?);

        let port = config.server.port;
        let state = WebhookState {
            twilio,
            openai,
            whisper,
            sessions,
            config,
        };

        Ok(Self { state, port })
    }

    /// Start the bot (webhook server)
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        WebhookServer::new(addr, self.state).start().await
    }
}
