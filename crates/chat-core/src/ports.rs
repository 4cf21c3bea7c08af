//! Port traits: the hexagonal architecture boundary.
//!
//! These traits are defined here in `chat-core` (pure Rust).
//! Implementations live in `chat-platform` (browser adapters).
//! The core never imports platform code; it only depends on these traits.

use async_trait::async_trait;
use chat_types::{
    Result,
    conversation::{AuthResponse, ConversationSummary, Credential},
    event::ChannelEvent,
    message::{HistoryPage, OutgoingMessage},
};

// ─── Transport Port ──────────────────────────────────────────

/// Who is connecting, and for which conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub chat_id: String,
    pub account: String,
}

#[async_trait(?Send)]
pub trait TransportPort {
    /// Open a channel authenticated with `credential`.
    /// Any previous connection is replaced.
    async fn connect(&self, credential: &Credential, context: &ClientContext) -> Result<()>;

    /// Close the current connection and drop its undelivered events
    fn disconnect(&self);

    /// Fire-and-forget send; fails only when no connection is open
    fn send(&self, message: &OutgoingMessage) -> Result<()>;

    /// Take all inbound events received since the last call, in arrival order
    fn drain_inbound(&self) -> Vec<ChannelEvent>;

    fn is_connected(&self) -> bool;
}

// ─── History Port ────────────────────────────────────────────

#[async_trait(?Send)]
pub trait HistoryPort {
    /// Stored messages of a conversation
    async fn fetch_messages(&self, chat_id: &str) -> Result<HistoryPage>;

    /// Remove a message and everything after it, server side
    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    /// Conversations owned by an account, newest first
    async fn list_conversations(&self, email: &str) -> Result<Vec<ConversationSummary>>;
}

// ─── Credential / Auth Ports ─────────────────────────────────

#[async_trait(?Send)]
pub trait CredentialPort {
    /// Issue a fresh channel credential
    async fn issue_credential(&self) -> Result<Credential>;
}

#[async_trait(?Send)]
pub trait AuthPort {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse>;

    async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<AuthResponse>;
}

// ─── Storage Port ────────────────────────────────────────────

#[async_trait(?Send)]
pub trait StoragePort {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Name of this backend (for logging/debug)
    fn backend_name(&self) -> &str;
}
