//! Chat payloads and the events exchanged with a websocket client.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One chat message. The relay never looks inside it; whatever JSON the
/// client sent is what gets stored, published and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(pub Value);

impl ChatMessage {
    /// Text record used for the history list and the bus.
    pub fn encode(&self) -> String {
        self.0.to_string()
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(ChatMessage)
    }

    /// Wraps bare text typed by a client that doesn't speak the event envelope.
    pub fn plain_text(text: &str) -> Self {
        ChatMessage(json!({
            "type": "text",
            "text": text,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/* ------------ client → server ------------ */
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatMessage(ChatMessage),
}

impl ClientEvent {
    /// Anything that isn't a well formed envelope is taken as plain text.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw)
            .unwrap_or_else(|_| ClientEvent::ChatMessage(ChatMessage::plain_text(raw)))
    }
}

/* ------------ server → client ------------ */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// History backlog, oldest first.
    LoadMessages(Vec<ChatMessage>),
    ChatMessage(ChatMessage),
}
