//! Browser adapters for the chat-core ports.
//!
//! | Port            | Adapter              |
//! |-----------------|----------------------|
//! | TransportPort   | `WebSocketTransport` |
//! | HistoryPort     | `HttpBackend`        |
//! | CredentialPort  | `HttpBackend`        |
//! | AuthPort        | `HttpBackend`        |
//! | StoragePort     | `LocalStorage`, `MemoryStorage` |

pub mod http;
pub mod storage;
pub mod transport;

pub use http::HttpBackend;
pub use storage::{LocalStorage, MemoryStorage, auto_detect_storage, open_storage};
pub use transport::WebSocketTransport;
