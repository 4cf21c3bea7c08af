//! UI-level state that drives rendering.
//! Messages are read from the session snapshot every frame; this holds only
//! what the session does not: input buffers, the status line, the banner,
//! the sidebar list and the login form. Updated each frame by draining the
//! EventBus.

use chat_core::ConnectionState;
use chat_types::{
    conversation::{ConversationSummary, UserProfile},
    event::SessionEvent,
};

/// State visible to UI panels
pub struct UiState {
    /// Connection as last reported by the session
    pub connection: ConnectionState,
    /// Message input content
    pub input_text: String,
    /// Draft of the message being edited, mirrored into the session
    pub edit_buffer: String,
    /// Status line text
    pub status_text: String,
    /// Last notable failure or notice, shown above the input
    pub banner: Option<Banner>,
    /// Sidebar entries, newest first
    pub conversations: Vec<ConversationSummary>,
    /// Set when the sidebar list should be fetched again
    pub conversations_stale: bool,
    pub signed_in: Option<UserProfile>,
    pub login: LoginForm,
    pub show_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub text: String,
    pub is_error: bool,
}

impl Banner {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub mode: AuthMode,
    pub email: String,
    pub password: String,
    pub full_name: String,
    /// Inline failure from the last attempt
    pub error: Option<String>,
    pub pending: bool,
}

impl LoginForm {
    pub fn can_submit(&self) -> bool {
        let filled = !self.email.trim().is_empty() && !self.password.is_empty();
        match self.mode {
            AuthMode::Login => filled && !self.pending,
            AuthMode::Register => filled && !self.full_name.trim().is_empty() && !self.pending,
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        self.error = None;
    }

    /// Forget everything typed, keeping the mode
    pub fn reset(&mut self) {
        *self = Self {
            mode: self.mode,
            ..Self::default()
        };
    }
}

impl UiState {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            input_text: String::new(),
            edit_buffer: String::new(),
            status_text: "Disconnected".to_string(),
            banner: None,
            conversations: Vec::new(),
            conversations_stale: false,
            signed_in: None,
            login: LoginForm::default(),
            show_settings: false,
        }
    }

    /// Process events from the EventBus and update UI state
    pub fn process_events(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::Connecting { chat_id } => {
                    self.status_text = format!("Connecting to {}...", short_id(&chat_id));
                    self.connection = ConnectionState::Connecting { chat_id };
                    self.banner = None;
                    self.edit_buffer.clear();
                }
                SessionEvent::Connected { chat_id } => {
                    self.status_text = "Connected".to_string();
                    self.connection = ConnectionState::Connected { chat_id };
                    self.conversations_stale = true;
                }
                SessionEvent::HistoryLoaded { .. } => {}
                SessionEvent::HistoryFailed { message, .. } => {
                    self.banner = Some(Banner::error(format!("Could not load history: {}", message)));
                }
                SessionEvent::TransportFailed { message } => {
                    self.connection = ConnectionState::Disconnected;
                    self.status_text = "Disconnected".to_string();
                    self.banner = Some(Banner::error(format!("Connection failed: {}", message)));
                }
                SessionEvent::ConnectionLost { reason } => {
                    self.connection = ConnectionState::Disconnected;
                    self.status_text = "Disconnected".to_string();
                    self.banner = Some(Banner::error(format!("Connection lost: {}", reason)));
                }
                SessionEvent::MessageSent { .. } => {
                    if matches!(self.banner, Some(Banner { is_error: true, .. })) {
                        self.banner = None;
                    }
                }
                SessionEvent::Truncated { removed, .. } => {
                    let noun = if removed == 1 { "message" } else { "messages" };
                    self.banner = Some(Banner::info(format!("Removed {} {}", removed, noun)));
                }
                SessionEvent::DeleteFailed { message, .. } => {
                    self.banner = Some(Banner::error(format!("Delete failed: {}", message)));
                }
                SessionEvent::Rejected { operation, message } => {
                    self.banner = Some(Banner::error(format!("Cannot {} now: {}", operation, message)));
                }
                SessionEvent::LoggedOut => {
                    self.connection = ConnectionState::Disconnected;
                    self.status_text = "Signed out".to_string();
                    self.signed_in = None;
                    self.conversations.clear();
                    self.input_text.clear();
                    self.edit_buffer.clear();
                    self.banner = None;
                    self.show_settings = false;
                }
            }
        }
    }

    pub fn sign_in(&mut self, user: UserProfile) {
        self.signed_in = Some(user);
        self.login.reset();
        self.conversations_stale = true;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.connection, ConnectionState::Connecting { .. })
    }

    pub fn can_send(&self) -> bool {
        self.is_connected() && !self.input_text.trim().is_empty()
    }

    /// Title of the active conversation, falling back to its short id
    pub fn conversation_title(&self, chat_id: &str) -> String {
        self.conversations
            .iter()
            .find(|c| c.chat_id == chat_id)
            .map(|c| c.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Chat {}", short_id(chat_id)))
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

/// First eight characters of an id, for status lines
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
