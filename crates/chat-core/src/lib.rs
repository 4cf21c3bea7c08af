pub mod ports;
pub mod event_bus;
pub mod store;
pub mod timeline;
pub mod session;

#[cfg(test)]
mod tests;

pub use event_bus::EventBus;
pub use session::{ConnectionState, EditDraft, SessionManager, SessionPorts};
pub use store::SessionStore;
pub use timeline::{MergeOutcome, Timeline};
