//! OpenAI chat-completion gateway

pub mod client;
pub mod types;

pub use client::OpenAiClient;
pub use types::{ChatMessage, MediaRef, Role};
