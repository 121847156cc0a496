use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the raw session identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a message, unique and increasing within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Message typed by the end user.
    User,
    /// Reply produced by the completion endpoint.
    Assistant,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Error => "error",
        }
    }

    /// Short glyph shown next to user messages.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Sending => "🕒",
            Self::Sent => "✓",
            Self::Delivered => "✓✓",
            Self::Read => "👁",
            Self::Error => "❌",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message contents before the session store assigns an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub sender: Sender,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    /// A user-authored message that has not been sent yet.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            status: MessageStatus::Sending,
            timestamp: Utc::now(),
        }
    }

    /// An assistant reply, created directly in its terminal status.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Assistant,
            status: MessageStatus::Delivered,
            timestamp: Utc::now(),
        }
    }
}

/// A message stored in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the session store.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Who authored the message.
    pub sender: Sender,
    /// Creation timestamp in UTC.
    pub timestamp: DateTime<Utc>,
    /// Delivery status; only meaningful for user messages.
    pub status: MessageStatus,
}

impl Message {
    /// Stamps a draft with its store-assigned identifier.
    pub fn from_new(id: MessageId, draft: NewMessage) -> Self {
        Self {
            id,
            text: draft.text,
            sender: draft.sender,
            timestamp: draft.timestamp,
            status: draft.status,
        }
    }

    /// Creation time formatted as local wall-clock time.
    pub fn display_time(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_new_creates_non_empty_value() {
        let session = SessionId::new();
        assert!(!session.as_str().is_empty());
        assert_ne!(session, SessionId::new());
    }

    #[test]
    fn sender_displays_lowercase() {
        assert_eq!(Sender::User.to_string(), "user");
        assert_eq!(Sender::Assistant.to_string(), "assistant");
    }

    #[test]
    fn new_message_constructors_pick_initial_status() {
        let user = NewMessage::user("hi");
        assert_eq!(user.sender, Sender::User);
        assert_eq!(user.status, MessageStatus::Sending);

        let reply = NewMessage::assistant("hello");
        assert_eq!(reply.sender, Sender::Assistant);
        assert_eq!(reply.status, MessageStatus::Delivered);
    }

    #[test]
    fn from_new_keeps_draft_fields() {
        let draft = NewMessage::user("question");
        let ts = draft.timestamp;
        let msg = Message::from_new(MessageId(3), draft);
        assert_eq!(msg.id, MessageId(3));
        assert_eq!(msg.text, "question");
        assert_eq!(msg.timestamp, ts);
        assert_eq!(msg.display_time().len(), 8);
    }

    #[test]
    fn status_serializes_lowercase_with_indicator() {
        let json = serde_json::to_string(&MessageStatus::Delivered).expect("serialize");
        assert_eq!(json, "\"delivered\"");
        assert_eq!(MessageStatus::Sending.indicator(), "🕒");
        assert_eq!(MessageStatus::Error.to_string(), "error");
    }
}
