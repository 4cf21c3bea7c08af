use serde::{Deserialize, Serialize};
use crate::message::{OutgoingMessage, StreamedMessage};

/// Events emitted by the session manager.
/// UI subscribes to these for status lines and banners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Reconnect sequence started for a conversation
    Connecting { chat_id: String },

    /// Channel is open and authenticated
    Connected { chat_id: String },

    /// History replayed into the timeline
    HistoryLoaded { chat_id: String, count: usize },

    /// History could not be fetched; timeline starts empty
    HistoryFailed { chat_id: String, message: String },

    /// Credential or channel setup failed, or a send could not be dispatched
    TransportFailed { message: String },

    /// The open channel dropped
    ConnectionLost { reason: String },

    /// A user message went out over the channel
    MessageSent { message_id: String },

    /// Timeline rewound at a deleted message
    Truncated { message_id: String, removed: usize },

    /// Delete was refused by the history service
    DeleteFailed { message_id: String, message: String },

    /// An operation was refused because the session is not ready
    Rejected { operation: String, message: String },

    LoggedOut,
}

/// Events surfaced by a transport channel, drained in FIFO order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelEvent {
    Message(StreamedMessage),
    Closed { reason: String },
}

/// Frames the client writes to the channel socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Must be the first frame on a fresh connection
    Auth {
        token: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    Message(OutgoingMessage),
}

/// Frames the server writes to the channel socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Message(StreamedMessage),
    Error { message: String },
}
