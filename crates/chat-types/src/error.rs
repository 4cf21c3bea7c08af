use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session not ready: {0}")]
    NotReady(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Message {0} cannot be edited")]
    NotEditable(String),

    #[error("Another message is already being edited: {0}")]
    EditInProgress(String),

    #[error("No message is being edited")]
    NoActiveEdit,

    #[error("Delete rejected for {message_id}: {message}")]
    DeleteRejected { message_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JS interop error: {0}")]
    JsInterop(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}
