use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminates user and assistant timeline entries.
/// Only `User` messages can be edited or deleted from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[serde(alias = "User", alias = "user_message")]
    User,
    #[serde(alias = "Assistant", alias = "assistant_message")]
    Assistant,
}

/// Who wrote a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Author {
    /// The human user, identified by account (email)
    User { account: String },
    Assistant,
}

impl Author {
    pub fn user(account: impl Into<String>) -> Self {
        Author::User {
            account: account.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Author::User { .. } => MessageKind::User,
            Author::Assistant => MessageKind::Assistant,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Author::User { account } if !account.is_empty() => account,
            Author::User { .. } => "You",
            Author::Assistant => "Assistant",
        }
    }
}

/// A single timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Client-generated token for locally originated sends
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
}

impl Message {
    /// A user message with a fresh local id, stamped now.
    pub fn user(account: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            author: Author::user(account),
            body: body.into(),
            created_at: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn assistant(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: Author::Assistant,
            body: body.into(),
            created_at: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.author.kind()
    }

    pub fn is_editable(&self) -> bool {
        self.kind() == MessageKind::User
    }
}

/// Fresh random id for a locally originated message
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fresh random conversation id
pub fn new_chat_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ─── Channel wire records ────────────────────────────────────

/// A message event pushed by the channel.
/// Repeated events with the same id carry the growing body of a streamed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamedMessage {
    pub id: String,
    pub role: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl StreamedMessage {
    pub fn into_message(self) -> Message {
        let author = match self.role {
            MessageKind::User => Author::user(self.author.unwrap_or_default()),
            MessageKind::Assistant => Author::Assistant,
        };
        Message {
            id: self.id,
            author,
            body: self.content,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            correlation_id: self.correlation_id,
        }
    }
}

/// A user message going out over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub correlation_id: String,
    pub author: String,
    pub content: String,
}

// ─── History wire records ────────────────────────────────────

/// One stored message as returned by the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub role: MessageKind,
    pub content: String,
    pub timestamp: String,
}

impl HistoryRecord {
    /// Convert to a timeline message. User entries are attributed to `account`.
    pub fn into_message(self, account: &str) -> Message {
        let author = match self.role {
            MessageKind::User => Author::user(account),
            MessageKind::Assistant => Author::Assistant,
        };
        Message {
            id: self.message_id,
            author,
            body: self.content,
            created_at: parse_timestamp(&self.timestamp),
            correlation_id: None,
        }
    }
}

/// Response body of the history endpoint; the list may be null or missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Option<Vec<HistoryRecord>>,
}

impl HistoryPage {
    pub fn into_messages(self, account: &str) -> Vec<Message> {
        self.messages
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.into_message(account))
            .collect()
    }
}

/// Accepts RFC 3339 and zone-less ISO 8601 (taken as UTC).
/// Unparseable values fall back to now so ordering by arrival still holds.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}
