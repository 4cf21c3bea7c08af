use serde::{Deserialize, Serialize};

/// Entry of the conversation list shown in the sidebar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub chat_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Response body of the conversation list endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationList {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
}

impl ConversationList {
    /// Newest first; entries without a timestamp sink to the end.
    pub fn sorted(mut self) -> Vec<ConversationSummary> {
        self.conversations
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.conversations
    }
}

/// The signed-in account, persisted across reloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    #[serde(default, alias = "FullName", alias = "full_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Response of login and register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: UserProfile,
}

/// Short-lived bearer value authorizing one channel connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
