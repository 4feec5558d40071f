//! Configuration management
//!
//! Settings are resolved in the following priority order:
//! 1. Environment variables
//! 2. wa-gateway.toml configuration file
//! 3. Defaults
//!
//! Inside the configuration file, `${VAR_NAME}` strings are expanded from the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Built-in start template, used when `CHAT_START_TEMPLATE` is unset or the
/// file it points to does not exist. `{user}` and `{today}` are substituted on
/// every request; `{agent_name}` once at load time.
pub const DEFAULT_START_TEMPLATE: &str = "You are {agent_name}, a friendly assistant chatting \
with {user} over WhatsApp. Today is {today}. Keep your replies short and conversational. \
If the user asks you for a picture, include [img:\"<image description>\"] in your reply.";

/// Default goodbye message; `{user}` is substituted with the sender name.
pub const DEFAULT_GOODBYE_MESSAGE: &str = "Goodbye, {user}! I'll be here if you need me.";

/// Canned reply for empty or un-processable messages, also used as the
/// delivery fallback.
pub const DEFAULT_APOLOGY_MESSAGE: &str = "Sorry, I didn't understand that. Please try again.";

/// OpenAI API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: String,

    /// Base URL (optional, for OpenAI-compatible endpoints)
    pub base_url: Option<String>,

    /// Sampling parameters forwarded verbatim to the completions endpoint
    #[serde(default)]
    pub sampling: SamplingConfig,
}

/// Model sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Chat model to use
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,

    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,

    /// Number of candidate completions; only the first is used
    #[serde(default = "default_n")]
    pub n: u8,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: default_frequency_penalty(),
            presence_penalty: default_presence_penalty(),
            n: default_n(),
        }
    }
}

/// Chat agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Agent display name used in prompt templating
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Start template text with `{agent_name}` already substituted
    #[serde(default = "default_start_template")]
    pub start_template: String,

    /// Goodbye message template (`{user}` placeholder)
    #[serde(default = "default_goodbye_message")]
    pub goodbye_message: String,

    /// Transcribe inbound voice notes via Whisper
    #[serde(default = "default_true")]
    pub voice_transcription: bool,

    /// Honor image-generation directives in replies
    #[serde(default = "default_true")]
    pub allow_images: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            start_template: default_start_template(),
            goodbye_message: default_goodbye_message(),
            voice_transcription: true,
            allow_images: true,
        }
    }
}

/// Twilio WhatsApp configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    /// Account SID
    pub account_sid: String,

    /// Auth token
    pub auth_token: String,

    /// WhatsApp sender number
    #[serde(default = "default_whatsapp_number")]
    pub whatsapp_number: String,

    /// Verify X-Twilio-Signature on inbound webhooks
    #[serde(default)]
    pub validate_signature: bool,
}

/// Webhook server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the webhook server
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Maximum non-system messages kept per session (0 = unlimited)
    #[serde(default)]
    pub max_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_messages: 0,
        }
    }
}

/// Main configuration for wa-gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenAI configuration
    pub openai: OpenAiConfig,

    /// Chat agent configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Twilio configuration
    pub twilio: TwilioConfig,

    /// Webhook server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session persistence configuration
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    1.2
}

fn default_top_p() -> f32 {
    1.0
}

fn default_frequency_penalty() -> f32 {
    0.3
}

fn default_presence_penalty() -> f32 {
    0.1
}

fn default_n() -> u8 {
    1
}

fn default_agent_name() -> String {
    "Assistant".to_string()
}

fn default_start_template() -> String {
    DEFAULT_START_TEMPLATE.to_string()
}

fn default_goodbye_message() -> String {
    DEFAULT_GOODBYE_MESSAGE.to_string()
}

fn default_whatsapp_number() -> String {
    "+14155238886".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_db_path() -> String {
    "data/wa-gateway.db".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Expand environment variables inside a configuration file
    ///
    /// Replaces `${VAR_NAME}` strings with the variable's value. Unset
    /// variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// `${VAR_NAME}` strings in the file are expanded from the environment,
    /// and environment variables override file values afterwards.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let template_path = config
            .chat
            .as_ref()
            .and_then(|c| c.start_template.clone());

        let mut cfg = Self::from_toml_config(config);
        cfg.apply_env_overrides(template_path);
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load configuration from the default locations
    ///
    /// Reads `./wa-gateway.toml` when present, otherwise falls back to
    /// environment variables only.
    pub fn load() -> crate::Result<Self> {
        if Path::new("wa-gateway.toml").exists() {
            return Self::from_toml_file("wa-gateway.toml");
        }

        Self::from_env()
    }

    /// Build a Config from the parsed TOML structure
    fn from_toml_config(toml: TomlConfig) -> Self {
        let openai = toml.openai.unwrap_or_default();
        let chat = toml.chat.unwrap_or_default();
        let twilio = toml.twilio.unwrap_or_default();
        let server = toml.server.unwrap_or_default();
        let session = toml.session.unwrap_or_default();

        let agent_name = chat.agent_name.unwrap_or_else(default_agent_name);
        let start_template =
            resolve_start_template(chat.start_template.as_deref(), &agent_name);

        Config {
            openai: OpenAiConfig {
                api_key: openai.api_key.unwrap_or_default(),
                base_url: openai.base_url,
                sampling: SamplingConfig {
                    model: openai.model.unwrap_or_else(default_model),
                    max_tokens: openai.max_tokens.unwrap_or_else(default_max_tokens),
                    temperature: openai.temperature.unwrap_or_else(default_temperature),
                    top_p: openai.top_p.unwrap_or_else(default_top_p),
                    frequency_penalty: openai
                        .frequency_penalty
                        .unwrap_or_else(default_frequency_penalty),
                    presence_penalty: openai
                        .presence_penalty
                        .unwrap_or_else(default_presence_penalty),
                    n: default_n(),
                },
            },
            chat: ChatConfig {
                agent_name,
                start_template,
                goodbye_message: chat.goodbye_message.unwrap_or_else(default_goodbye_message),
                voice_transcription: chat.voice_transcription.unwrap_or(true),
                allow_images: chat.allow_images.unwrap_or(true),
            },
            twilio: TwilioConfig {
                account_sid: twilio.account_sid.unwrap_or_default(),
                auth_token: twilio.auth_token.unwrap_or_default(),
                whatsapp_number: twilio
                    .whatsapp_number
                    .unwrap_or_else(default_whatsapp_number),
                validate_signature: twilio.validate_signature.unwrap_or(false),
            },
            server: ServerConfig {
                port: server.port.unwrap_or_else(default_port),
            },
            session: SessionConfig {
                db_path: session.db_path.unwrap_or_else(default_db_path),
                max_messages: session.max_messages.unwrap_or(0),
            },
        }
    }

    /// Override settings from environment variables.
    ///
    /// `file_template_path` is the start-template path from the config file,
    /// if any; `CHAT_START_TEMPLATE` takes precedence over it.
    fn apply_env_overrides(&mut self, file_template_path: Option<String>) {
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            if !api_key.is_empty() {
                self.openai.api_key = api_key;
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                self.openai.base_url = Some(base_url);
            }
        }
        if let Ok(model) = std::env::var("CHAT_MODEL") {
            if !model.is_empty() {
                self.openai.sampling.model = model;
            }
        }
        if let Ok(v) = std::env::var("MAX_TOKENS") {
            if let Ok(v) = v.parse() {
                self.openai.sampling.max_tokens = v;
            }
        }
        if let Ok(v) = std::env::var("TEMPERATURE") {
            if let Ok(v) = v.parse() {
                self.openai.sampling.temperature = v;
            }
        }
        if let Ok(v) = std::env::var("TOP_P") {
            if let Ok(v) = v.parse() {
                self.openai.sampling.top_p = v;
            }
        }
        if let Ok(v) = std::env::var("FREQUENCY_PENALTY") {
            if let Ok(v) = v.parse() {
                self.openai.sampling.frequency_penalty = v;
            }
        }
        if let Ok(v) = std::env::var("PRESENCE_PENALTY") {
            if let Ok(v) = v.parse() {
                self.openai.sampling.presence_penalty = v;
            }
        }

        if let Ok(name) = std::env::var("AGENT_NAME") {
            if !name.is_empty() {
                self.chat.agent_name = name;
            }
        }
        // The template is re-resolved whenever either source could have
        // changed it: env path wins, then the file path, then the default.
        let template_path = std::env::var("CHAT_START_TEMPLATE")
            .ok()
            .filter(|p| !p.is_empty())
            .or(file_template_path);
        self.chat.start_template =
            resolve_start_template(template_path.as_deref(), &self.chat.agent_name);
        if let Ok(msg) = std::env::var("GOODBYE_MESSAGE") {
            if !msg.is_empty() {
                self.chat.goodbye_message = msg;
            }
        }
        if let Ok(v) = std::env::var("VOICE_TRANSCRIPTION") {
            self.chat.voice_transcription = v.to_lowercase() != "false";
        }
        if let Ok(v) = std::env::var("ALLOW_IMAGES") {
            self.chat.allow_images = v.to_lowercase() != "false";
        }

        if let Ok(sid) = std::env::var("TWILIO_ACCOUNT_SID") {
            if !sid.is_empty() {
                self.twilio.account_sid = sid;
            }
        }
        if let Ok(token) = std::env::var("TWILIO_AUTH_TOKEN") {
            if !token.is_empty() {
                self.twilio.auth_token = token;
            }
        }
        if let Ok(number) = std::env::var("TWILIO_WHATSAPP_NUMBER") {
            if !number.is_empty() {
                self.twilio.whatsapp_number = number;
            }
        }
        if let Ok(v) = std::env::var("VALIDATE_TWILIO_SIGNATURE") {
            self.twilio.validate_signature = v.to_lowercase() == "true";
        }

        if let Ok(port) = std::env::var("WEBHOOK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            self.session.db_path = path;
        }
        if let Ok(v) = std::env::var("MAX_SESSION_MESSAGES") {
            if let Ok(v) = v.parse() {
                self.session.max_messages = v;
            }
        }
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::from_toml_config(TomlConfig::default());
        cfg.apply_env_overrides(None);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Required credentials must be present before any client is built
    fn validate(&self) -> crate::Result<()> {
        if self.openai.api_key.is_empty() {
            return Err(Error::Config("OPENAI_API_KEY not set".to_string()));
        }
        if self.twilio.account_sid.is_empty() || self.twilio.auth_token.is_empty() {
            return Err(Error::Config(
                "TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN must be set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the start template: `path` points at a template file; when it is
/// unset or unreadable the built-in default applies. `{agent_name}` is
/// substituted here, once.
fn resolve_start_template(path: Option<&str>, agent_name: &str) -> String {
    let template = match path {
        Some(p) if Path::new(p).exists() => {
            std::fs::read_to_string(p).unwrap_or_else(|_| DEFAULT_START_TEMPLATE.to_string())
        }
        _ => DEFAULT_START_TEMPLATE.to_string(),
    };
    template.replace("{agent_name}", agent_name)
}

// ============================================================================
// TOML structures (file parsing)
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    openai: Option<TomlOpenAiConfig>,
    chat: Option<TomlChatConfig>,
    twilio: Option<TomlTwilioConfig>,
    server: Option<TomlServerConfig>,
    session: Option<TomlSessionConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOpenAiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    frequency_penalty: Option<f32>,
    #[serde(default)]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlChatConfig {
    #[serde(default)]
    agent_name: Option<String>,
    /// Path to a start-template file
    #[serde(default)]
    start_template: Option<String>,
    #[serde(default)]
    goodbye_message: Option<String>,
    #[serde(default)]
    voice_transcription: Option<bool>,
    #[serde(default)]
    allow_images: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlTwilioConfig {
    #[serde(default)]
    account_sid: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    whatsapp_number: Option<String>,
    #[serde(default)]
    validate_signature: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSessionConfig {
    #[serde(default)]
    db_path: Option<String>,
    #[serde(default)]
    max_messages: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_defaults() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.model, "gpt-3.5-turbo");
        assert_eq!(sampling.max_tokens, 1000);
        assert_eq!(sampling.temperature, 1.2);
        assert_eq!(sampling.top_p, 1.0);
        assert_eq!(sampling.frequency_penalty, 0.3);
        assert_eq!(sampling.presence_penalty, 0.1);
        assert_eq!(sampling.n, 1);
    }

    #[test]
    fn test_chat_defaults() {
        let chat = ChatConfig::default();
        assert!(chat.voice_transcription);
        assert!(chat.allow_images);
        assert!(chat.goodbye_message.contains("{user}"));
    }

    #[test]
    fn test_session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.db_path, "data/wa-gateway.db");
        assert_eq!(session.max_messages, 0);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("WA_GATEWAY_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${WA_GATEWAY_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${WA_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("WA_GATEWAY_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        let result = Config::expand_env_vars("no_vars_here");
        assert_eq!(result, "no_vars_here");
    }

    #[test]
    fn test_resolve_start_template_default() {
        let template = resolve_start_template(None, "Robo");
        assert!(template.contains("Robo"));
        assert!(template.contains("{user}"));
        assert!(template.contains("{today}"));
        assert!(!template.contains("{agent_name}"));
    }

    #[test]
    fn test_resolve_start_template_missing_file() {
        let template = resolve_start_template(Some("/nonexistent/template.txt"), "Robo");
        assert!(template.contains("Robo"));
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[openai]
api_key = "test_key"
model = "gpt-4o-mini"
max_tokens = 512
temperature = 0.7

[chat]
agent_name = "Robo"
goodbye_message = "Bye {user}!"
allow_images = false

[twilio]
account_sid = "AC123"
auth_token = "token123"
whatsapp_number = "+15550001111"

[server]
port = 8080

[session]
db_path = "/tmp/sessions.db"
max_messages = 40
"#;

        let toml_config: TomlConfig = toml::from_str(toml_content).unwrap();
        let config = Config::from_toml_config(toml_config);

        assert_eq!(config.openai.api_key, "test_key");
        assert_eq!(config.openai.sampling.model, "gpt-4o-mini");
        assert_eq!(config.openai.sampling.max_tokens, 512);
        assert_eq!(config.openai.sampling.temperature, 0.7);
        // Unset values fall back to defaults
        assert_eq!(config.openai.sampling.top_p, 1.0);

        assert_eq!(config.chat.agent_name, "Robo");
        assert_eq!(config.chat.goodbye_message, "Bye {user}!");
        assert!(!config.chat.allow_images);
        assert!(config.chat.voice_transcription);
        assert!(config.chat.start_template.contains("Robo"));

        assert_eq!(config.twilio.account_sid, "AC123");
        assert_eq!(config.twilio.whatsapp_number, "+15550001111");
        assert!(!config.twilio.validate_signature);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.db_path, "/tmp/sessions.db");
        assert_eq!(config.session.max_messages, 40);
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let config = Config::from_toml_config(TomlConfig::default());
        assert!(config.validate().is_err());
    }
}
