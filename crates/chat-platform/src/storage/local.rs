//! `window.localStorage` backend.
//! Persistent across page reloads. Values are stored as UTF-8 strings,
//! which covers everything the session persists (token, JSON profile,
//! chat id, JSON config).

use async_trait::async_trait;
use wasm_bindgen::JsValue;
use web_sys::Storage;

use chat_core::ports::StoragePort;
use chat_types::{ChatError, Result};

pub struct LocalStorage {
    storage: Storage,
}

fn storage_err(e: JsValue) -> ChatError {
    ChatError::Storage(format!("{:?}", e))
}

impl LocalStorage {
    /// Bind to the window's localStorage.
    /// Fails outside a browser window or when storage access is blocked.
    pub fn open() -> Result<Self> {
        let window = web_sys::window()
            .ok_or_else(|| ChatError::Storage("No window object".to_string()))?;

        let storage = window
            .local_storage()
            .map_err(storage_err)?
            .ok_or_else(|| ChatError::Storage("localStorage not available".to_string()))?;

        Ok(Self { storage })
    }
}

#[async_trait(?Send)]
impl StoragePort for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.storage.get_item(key).map_err(storage_err)?;
        Ok(value.map(String::into_bytes))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(value)
            .map_err(|e| ChatError::Storage(format!("{}: value is not UTF-8: {}", key, e)))?;
        self.storage.set_item(key, text).map_err(storage_err)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.storage.remove_item(key).map_err(storage_err)
    }

    fn backend_name(&self) -> &str {
        "localStorage"
    }
}
