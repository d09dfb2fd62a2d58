//! Conversation sessions referenced by the voice pipeline.
//!
//! Sessions are owned by an external persistence layer; this module only defines the shape
//! the relay reads and appends to, and the [`SessionStore`] seam it talks through.

mod store;

pub use store::{InMemorySessionStore, JsonFileSessionStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by session stores.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The backing file could not be read or written.
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A stored session document could not be (de)serialized.
    #[error("Session document is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human participant.
    User,
    /// The assistant.
    Bot,
}

/// How a turn was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Spoken and transcribed.
    Voice,
    /// Typed or generated text.
    Text,
}

/// One entry in a session's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// Unique turn identifier.
    pub id: String,
    /// Author of the turn.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Delivery channel.
    pub message_type: MessageType,
}

impl ChatTurn {
    fn at(role: TurnRole, content: String, message_type: MessageType, at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: format_rfc3339(at),
            message_type,
        }
    }
}

/// A persisted conversation with an append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub id: String,
    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Ordered chat turns.
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    /// RFC 3339 time of the last modification.
    pub last_edited_at: String,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            chat_history: Vec::new(),
            last_edited_at: format_rfc3339(OffsetDateTime::now_utc()),
        }
    }

    /// Append a transcribed user voice turn followed by the assistant's text reply.
    pub fn append_voice_exchange(&mut self, transcript: String, reply: String) {
        self.apply(VoiceExchange::new(transcript, reply));
    }

    /// Push both turns of `exchange` and move `last_edited_at` to the reply time.
    pub fn apply(&mut self, exchange: VoiceExchange) {
        self.last_edited_at = exchange.bot.timestamp.clone();
        self.chat_history.push(exchange.user);
        self.chat_history.push(exchange.bot);
    }
}

/// A user voice turn and the assistant reply to it, stamped and ready to append.
///
/// The reply is stamped strictly after the user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceExchange {
    /// Transcribed user turn.
    pub user: ChatTurn,
    /// Assistant text turn.
    pub bot: ChatTurn,
}

impl VoiceExchange {
    /// Stamp both turns now.
    pub fn new(transcript: String, reply: String) -> Self {
        let spoken_at = OffsetDateTime::now_utc();
        let answered_at =
            OffsetDateTime::now_utc().max(spoken_at + time::Duration::microseconds(1));
        Self {
            user: ChatTurn::at(TurnRole::User, transcript, MessageType::Voice, spoken_at),
            bot: ChatTurn::at(TurnRole::Bot, reply, MessageType::Text, answered_at),
        }
    }
}

/// Persistence seam for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by identifier; `Ok(None)` when it does not exist.
    async fn find(&self, id: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Persist the full session document.
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Append `exchange` to the stored session as one read-modify-write.
    ///
    /// Concurrent appends to the same store never drop each other's turns. Returns the updated
    /// session, or `Ok(None)` when it does not exist.
    async fn append_exchange(
        &self,
        id: &str,
        exchange: VoiceExchange,
    ) -> Result<Option<Session>, SessionStoreError>;
}

fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_exchange_appends_user_then_bot() {
        let mut session = Session::new("abc");
        session.append_voice_exchange("what time is it".into(), "Noon.".into());

        let [user, bot] = session.chat_history.as_slice() else {
            panic!("expected two turns");
        };
        assert_eq!(user.role, TurnRole::User);
        assert_eq!(user.message_type, MessageType::Voice);
        assert_eq!(user.content, "what time is it");
        assert_eq!(bot.role, TurnRole::Bot);
        assert_eq!(bot.message_type, MessageType::Text);
        assert_ne!(user.id, bot.id);
        assert_ne!(user.timestamp, bot.timestamp);
        assert_eq!(session.last_edited_at, bot.timestamp);
    }

    #[test]
    fn turns_serialize_with_camel_case_fields() {
        let mut session = Session::new("abc");
        session.append_voice_exchange("hi".into(), "hello".into());
        let json = serde_json::to_value(&session).expect("json");
        assert_eq!(json["chatHistory"][0]["messageType"], "voice");
        assert_eq!(json["chatHistory"][1]["role"], "bot");
        assert!(json["lastEditedAt"].is_string());
    }

    #[test]
    fn applying_an_exchange_keeps_earlier_turns() {
        let mut session = Session::new("abc");
        session.append_voice_exchange("first".into(), "one".into());
        let exchange = VoiceExchange::new("second".into(), "two".into());
        let reply_time = exchange.bot.timestamp.clone();

        session.apply(exchange);

        let contents: Vec<_> = session
            .chat_history
            .iter()
            .map(|turn| turn.content.as_str())
            .collect();
        assert_eq!(contents, ["first", "one", "second", "two"]);
        assert_eq!(session.last_edited_at, reply_time);
    }
}
