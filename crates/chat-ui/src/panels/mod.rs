pub mod chat;
pub mod login;
pub mod settings;
pub mod sidebar;

pub use chat::{ChatAction, chat_panel};
pub use login::{LoginAction, login_panel};
pub use settings::{SaveFeedback, SettingsAction, settings_panel};
pub use sidebar::{SidebarAction, sidebar_panel};
