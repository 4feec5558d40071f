//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, Role};

/// Identity of a conversation participant, rebuilt from every inbound webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Phone identifier; unique session key
    pub phone_number: String,
    /// Display name; falls back to the phone number
    pub display_name: String,
}

impl Sender {
    /// Create a sender; a missing or empty profile name falls back to the
    /// phone number.
    pub fn new(phone_number: impl Into<String>, profile_name: Option<&str>) -> Self {
        let phone_number = phone_number.into();
        let display_name = match profile_name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => phone_number.clone(),
        };
        Self {
            phone_number,
            display_name,
        }
    }
}

/// Full conversation state for one sender.
///
/// `messages[0]` is reserved for the current system prompt and is rewritten,
/// never appended, on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: String,
    /// Owning sender
    pub sender: Sender,
    /// Conversation messages, insertion order = conversation order
    pub messages: Vec<ChatMessage>,
    /// Language detected on the first real turn
    pub language: Option<String>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new session seeded with the (not yet formatted) start template
    /// as its sole system message.
    pub fn new(sender: Sender, start_template: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            messages: vec![ChatMessage::system(start_template)],
            language: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the session
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Rewrite the reserved system-prompt slot from the start template,
    /// substituting the sender name and the current date, and appending the
    /// detected-language instruction when one is recorded.
    pub fn refresh_system_prompt(&mut self, template: &str, today: &str) {
        let mut prompt = template
            .replace("{user}", &self.sender.display_name)
            .replace("{today}", today);

        if let Some(language) = &self.language {
            prompt.push_str(&format!(" Always reply in {}.", language));
        }

        let system = ChatMessage::system(prompt);
        if self.messages.is_empty() {
            self.messages.push(system);
        } else {
            self.messages[0] = system;
        }
        self.updated_at = Utc::now();
    }

    /// True until the first real turn is appended (only the system prompt
    /// exists).
    pub fn is_first_turn(&self) -> bool {
        self.messages.len() == 1
    }

    /// Get message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Render the conversation as text, one turn per line (logging)
    pub fn conversation(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
