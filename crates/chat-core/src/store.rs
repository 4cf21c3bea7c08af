//! Persistence bridge: typed access to the few values that survive a reload.
//!
//! Layout in the underlying `StoragePort`:
//!   "token"       → bearer token (UTF-8)
//!   "user"        → JSON `UserProfile`
//!   "chatId"      → last-active conversation id (UTF-8)
//!   "chat:config" → JSON `ClientConfig`

use std::rc::Rc;
use chat_types::{
    ChatError, Result,
    config::ClientConfig,
    conversation::UserProfile,
};
use crate::ports::StoragePort;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const CHAT_ID_KEY: &str = "chatId";
pub const CONFIG_KEY: &str = "chat:config";

#[derive(Clone)]
pub struct SessionStore {
    storage: Rc<dyn StoragePort>,
}

impl SessionStore {
    pub fn new(storage: Rc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    pub fn backend_name(&self) -> &str {
        self.storage.backend_name()
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.storage.get(key).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| ChatError::Storage(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.storage.set(key, value.as_bytes()).await
    }

    // ─── Account ─────────────────────────────────────────────

    pub async fn token(&self) -> Result<Option<String>> {
        self.get_string(TOKEN_KEY).await
    }

    pub async fn user(&self) -> Result<Option<UserProfile>> {
        match self.storage.get(USER_KEY).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn save_account(&self, token: &str, user: &UserProfile) -> Result<()> {
        let json = serde_json::to_vec(user)?;
        self.set_string(TOKEN_KEY, token).await?;
        self.storage.set(USER_KEY, &json).await
    }

    /// Forget token and profile. The last chat id is left in place so the
    /// conversation can be resumed after the next sign-in.
    pub async fn clear_account(&self) -> Result<()> {
        self.storage.delete(TOKEN_KEY).await?;
        self.storage.delete(USER_KEY).await
    }

    // ─── Conversation ────────────────────────────────────────

    pub async fn last_chat_id(&self) -> Result<Option<String>> {
        Ok(self
            .get_string(CHAT_ID_KEY)
            .await?
            .filter(|id| !id.is_empty()))
    }

    pub async fn set_last_chat_id(&self, chat_id: &str) -> Result<()> {
        self.set_string(CHAT_ID_KEY, chat_id).await
    }

    // ─── Config ──────────────────────────────────────────────

    pub async fn load_config(&self) -> Result<Option<ClientConfig>> {
        match self.storage.get(CONFIG_KEY).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn save_config(&self, config: &ClientConfig) -> Result<()> {
        let json = serde_json::to_vec(config)?;
        self.storage.set(CONFIG_KEY, &json).await
    }
}
