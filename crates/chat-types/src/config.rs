use serde::{Deserialize, Serialize};

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub dedup: DedupPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the HTTP API (login, history, credentials)
    pub api_base: String,
    /// WebSocket endpoint of the streaming channel
    pub channel_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackendType {
    /// Auto-detect best available backend
    Auto,
    Memory,
    LocalStorage,
}

/// How an inbound message is recognised as the echo of a local send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// Drop inbound messages whose body already appears in the timeline
    #[default]
    ContentEquality,
    /// Match the correlation token carried through the channel
    CorrelationToken,
}

impl DedupPolicy {
    pub fn all() -> &'static [DedupPolicy] {
        &[DedupPolicy::ContentEquality, DedupPolicy::CorrelationToken]
    }

    pub fn label(&self) -> &str {
        match self {
            DedupPolicy::ContentEquality => "Content equality",
            DedupPolicy::CorrelationToken => "Correlation token",
        }
    }
}

const DEFAULT_API_BASE: &str = "http://localhost:80";
const DEFAULT_CHANNEL_URL: &str = "ws://localhost:80/chainlit/ws";
