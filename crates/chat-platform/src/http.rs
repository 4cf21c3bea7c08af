//! HTTP adapter for the history, credential and auth collaborators.
//!
//! Uses browser `fetch()` via gloo-net. All endpoints hang off
//! `BackendConfig::api_base`.

use std::cell::RefCell;
use async_trait::async_trait;
use gloo_net::http::{Request, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use chat_core::ports::{AuthPort, CredentialPort, HistoryPort};
use chat_types::{
    ChatError, Result,
    config::BackendConfig,
    conversation::{AuthResponse, ConversationList, ConversationSummary, Credential},
    message::HistoryPage,
};

pub struct HttpBackend {
    config: BackendConfig,
    /// Account token attached to history calls once signed in
    access_token: RefCell<Option<String>>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            access_token: RefCell::new(None),
        }
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.borrow_mut() = token;
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.access_token.borrow().as_deref() {
            Some(token) => builder.header("Authorization", &format!("Bearer {}", token)),
            None => builder,
        }
    }

    fn messages_url(&self, chat_id: &str) -> String {
        self.config
            .endpoint(&format!("conversations/{}/messages", encode(chat_id)))
    }
}

/// Percent-encode a path segment or form value.
pub fn encode(value: &str) -> String {
    String::from(js_sys::encode_uri_component(value))
}

/// `application/x-www-form-urlencoded` body
pub fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn network(e: gloo_net::Error) -> ChatError {
    ChatError::Network(e.to_string())
}

/// Error text of a failed response: FastAPI-style `detail` when present.
async fn failure_text(response: Response) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => match body["detail"].as_str() {
            Some(detail) => format!("HTTP {}: {}", status, detail),
            None => format!("HTTP {}: {}", status, text),
        },
        Err(_) => format!("HTTP {}: {}", status, text),
    }
}

#[async_trait(?Send)]
impl HistoryPort for HttpBackend {
    async fn fetch_messages(&self, chat_id: &str) -> Result<HistoryPage> {
        let response = self
            .authorized(Request::get(&self.messages_url(chat_id)))
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::History(failure_text(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::History(e.to_string()))
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.messages_url(chat_id), encode(message_id));
        let response = self
            .authorized(Request::delete(&url))
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::History(failure_text(response).await));
        }
        Ok(())
    }

    async fn list_conversations(&self, email: &str) -> Result<Vec<ConversationSummary>> {
        let response = self
            .authorized(Request::post(&self.config.endpoint("conversations")))
            .json(&json!({ "email": email }))
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::History(failure_text(response).await));
        }

        let list: ConversationList = response
            .json()
            .await
            .map_err(|e| ChatError::History(e.to_string()))?;
        Ok(list.sorted())
    }
}

#[derive(Deserialize)]
struct CredentialBody {
    token: String,
}

#[async_trait(?Send)]
impl CredentialPort for HttpBackend {
    async fn issue_credential(&self) -> Result<Credential> {
        let response = Request::get(&self.config.endpoint("custom-auth"))
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::Network(failure_text(response).await));
        }

        let body: CredentialBody = response
            .json()
            .await
            .map_err(|e| ChatError::Serialization(e.to_string()))?;
        if body.token.is_empty() {
            return Err(ChatError::Network("empty credential".to_string()));
        }
        Ok(Credential { token: body.token })
    }
}

#[async_trait(?Send)]
impl AuthPort for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response = Request::post(&self.config.endpoint("login"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form_body(&[("username", email), ("password", password)]))
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::Auth(failure_text(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::Auth(e.to_string()))
    }

    async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<AuthResponse> {
        let response = Request::post(&self.config.endpoint("register"))
            .json(&json!({
                "email": email,
                "password": password,
                "full_name": full_name,
            }))
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;

        if !response.ok() {
            return Err(ChatError::Auth(failure_text(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| ChatError::Auth(e.to_string()))
    }
}
