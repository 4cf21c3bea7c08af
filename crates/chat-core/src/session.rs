//! Conversation session manager: owns the active conversation, the single
//! live channel, and the timeline mutations the UI can request.
//!
//! State machine:
//!   Disconnected ──connect/switch/new──▶ Connecting ──channel open──▶ Connected
//!   Connected ──switch/new──▶ Connecting (channel torn down, timeline cleared)
//!   Connected ──channel dropped──▶ Disconnected (manual retry)
//!   any ──logout──▶ Disconnected
//!
//! Every reconnect bumps a generation counter. Async completions capture the
//! generation they were issued under and are dropped if it moved on, so
//! overlapping switches converge on the last requested conversation.
//!
//! All methods take `&self`; state lives in a RefCell that is never borrowed
//! across an `.await`.

use std::cell::RefCell;
use std::rc::Rc;

use chat_types::{
    ChatError, Result,
    config::DedupPolicy,
    conversation::{ConversationSummary, Credential, UserProfile},
    event::{ChannelEvent, SessionEvent},
    message::{Message, OutgoingMessage, new_chat_id},
};
use crate::event_bus::EventBus;
use crate::ports::{ClientContext, CredentialPort, HistoryPort, TransportPort};
use crate::store::SessionStore;
use crate::timeline::{MergeOutcome, Timeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { chat_id: String },
    Connected { chat_id: String },
}

/// A user message being rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub message_id: String,
    pub draft: String,
}

/// Collaborators injected into the session
#[derive(Clone)]
pub struct SessionPorts {
    pub transport: Rc<dyn TransportPort>,
    pub history: Rc<dyn HistoryPort>,
    pub credentials: Rc<dyn CredentialPort>,
    pub store: SessionStore,
}

struct SessionInner {
    state: ConnectionState,
    active_chat_id: Option<String>,
    account: String,
    credential: Option<Credential>,
    timeline: Timeline,
    editing: Option<EditDraft>,
    generation: u64,
}

pub struct SessionManager {
    inner: RefCell<SessionInner>,
    transport: Rc<dyn TransportPort>,
    history: Rc<dyn HistoryPort>,
    credentials: Rc<dyn CredentialPort>,
    store: SessionStore,
    event_bus: EventBus<SessionEvent>,
}

impl SessionManager {
    pub fn new(ports: SessionPorts, dedup: DedupPolicy, event_bus: EventBus<SessionEvent>) -> Self {
        Self {
            inner: RefCell::new(SessionInner {
                state: ConnectionState::Disconnected,
                active_chat_id: None,
                account: String::new(),
                credential: None,
                timeline: Timeline::new(dedup),
                editing: None,
                generation: 0,
            }),
            transport: ports.transport,
            history: ports.history,
            credentials: ports.credentials,
            store: ports.store,
            event_bus,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.borrow().generation == generation
    }

    // ─── Accessors ───────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner.borrow().state, ConnectionState::Connected { .. })
    }

    pub fn active_chat_id(&self) -> Option<String> {
        self.inner.borrow().active_chat_id.clone()
    }

    pub fn account(&self) -> String {
        self.inner.borrow().account.clone()
    }

    pub fn has_credential(&self) -> bool {
        self.inner.borrow().credential.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    /// Current timeline, for rendering
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.borrow().timeline.snapshot()
    }

    pub fn message_count(&self) -> usize {
        self.inner.borrow().timeline.len()
    }

    pub fn editing(&self) -> Option<EditDraft> {
        self.inner.borrow().editing.clone()
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        self.inner.borrow().timeline.policy()
    }

    pub fn set_dedup_policy(&self, policy: DedupPolicy) {
        self.with(|s| s.timeline.set_policy(policy));
    }

    pub fn event_bus(&self) -> EventBus<SessionEvent> {
        self.event_bus.clone()
    }

    /// Account used to attribute user messages
    pub fn set_account(&self, user: &UserProfile) {
        self.with(|s| s.account = user.email.clone());
    }

    // ─── Reconnect sequence ──────────────────────────────────

    /// Open a channel for `chat_id` from a disconnected session.
    pub async fn connect(&self, chat_id: &str) -> Result<()> {
        self.switch_conversation(chat_id).await
    }

    /// Make `chat_id` the active conversation: persist it, tear down the
    /// channel, clear the timeline, then fetch history and reconnect.
    pub async fn switch_conversation(&self, chat_id: &str) -> Result<()> {
        self.reconnect(chat_id, true).await
    }

    /// Start a fresh conversation under a random id. Returns the new id.
    pub async fn new_conversation(&self) -> Result<String> {
        let chat_id = new_chat_id();
        self.reconnect(&chat_id, false).await?;
        Ok(chat_id)
    }

    /// Reconnect if the persisted conversation differs from the active one
    /// (e.g. after a reload); start a new conversation if none is persisted.
    pub async fn resume(&self) -> Result<()> {
        let persisted = self.persisted_chat_id().await;
        let active = self.active_chat_id();

        match persisted {
            Some(chat_id) if active.as_deref() != Some(chat_id.as_str()) => {
                log::info!("Resuming conversation {}", chat_id);
                self.switch_conversation(&chat_id).await
            }
            Some(chat_id) if !self.is_ready() || !self.transport.is_connected() => {
                log::info!("Channel for {} is down, reconnecting", chat_id);
                self.switch_conversation(&chat_id).await
            }
            Some(_) => Ok(()),
            None => self.new_conversation().await.map(|_| ()),
        }
    }

    /// Re-run the reconnect sequence for the active (or persisted) conversation.
    pub async fn retry(&self) -> Result<()> {
        let chat_id = match self.active_chat_id() {
            Some(chat_id) => Some(chat_id),
            None => self.persisted_chat_id().await,
        };
        match chat_id {
            Some(chat_id) => self.switch_conversation(&chat_id).await,
            None => self.new_conversation().await.map(|_| ()),
        }
    }

    async fn persisted_chat_id(&self) -> Option<String> {
        self.store.last_chat_id().await.unwrap_or_else(|e| {
            log::warn!("Could not read last chat id: {}", e);
            None
        })
    }

    async fn reconnect(&self, chat_id: &str, fetch_history: bool) -> Result<()> {
        let generation = self.with(|s| {
            s.generation += 1;
            s.active_chat_id = Some(chat_id.to_string());
            s.state = ConnectionState::Connecting {
                chat_id: chat_id.to_string(),
            };
            s.credential = None;
            s.editing = None;
            s.timeline.clear();
            s.generation
        });
        self.transport.disconnect();
        self.event_bus.emit(SessionEvent::Connecting {
            chat_id: chat_id.to_string(),
        });
        log::info!("Connecting to conversation {} (generation {})", chat_id, generation);

        if let Err(e) = self.store.set_last_chat_id(chat_id).await {
            log::warn!("Could not persist chat id {}: {}", chat_id, e);
        }

        if fetch_history {
            let (_, connected) = futures::join!(
                self.load_history(generation, chat_id),
                self.open_channel(generation, chat_id)
            );
            connected
        } else {
            self.open_channel(generation, chat_id).await
        }
    }

    async fn load_history(&self, generation: u64, chat_id: &str) {
        let account = self.account();
        let result = self.history.fetch_messages(chat_id).await;

        if !self.is_current(generation) {
            log::debug!("Discarding stale history for {}", chat_id);
            return;
        }

        match result {
            Ok(page) => {
                let messages = page.into_messages(&account);
                let count = self.with(|s| s.timeline.replay_history(messages));
                log::info!("Loaded {} messages for {}", count, chat_id);
                self.event_bus.emit(SessionEvent::HistoryLoaded {
                    chat_id: chat_id.to_string(),
                    count,
                });
            }
            Err(e) => {
                log::warn!("History fetch failed for {}: {}", chat_id, e);
                self.with(|s| s.timeline.clear());
                self.event_bus.emit(SessionEvent::HistoryFailed {
                    chat_id: chat_id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn open_channel(&self, generation: u64, chat_id: &str) -> Result<()> {
        let credential = match self.credentials.issue_credential().await {
            Ok(credential) => credential,
            Err(e) => return self.fail_connect(generation, e),
        };

        if !self.is_current(generation) {
            log::debug!("Dropping credential issued for superseded {}", chat_id);
            return Ok(());
        }

        let context = ClientContext {
            chat_id: chat_id.to_string(),
            account: self.account(),
        };
        if let Err(e) = self.transport.connect(&credential, &context).await {
            return self.fail_connect(generation, e);
        }

        if !self.is_current(generation) {
            log::debug!("Channel for {} superseded before it opened", chat_id);
            return Ok(());
        }

        self.with(|s| {
            s.credential = Some(credential);
            s.state = ConnectionState::Connected {
                chat_id: chat_id.to_string(),
            };
        });
        log::info!("Connected to conversation {}", chat_id);
        self.event_bus.emit(SessionEvent::Connected {
            chat_id: chat_id.to_string(),
        });
        Ok(())
    }

    fn fail_connect(&self, generation: u64, error: ChatError) -> Result<()> {
        if !self.is_current(generation) {
            log::debug!("Ignoring failure of superseded connect: {}", error);
            return Ok(());
        }
        log::error!("Channel connect failed: {}", error);
        self.with(|s| {
            s.state = ConnectionState::Disconnected;
            s.credential = None;
        });
        self.event_bus.emit(SessionEvent::TransportFailed {
            message: error.to_string(),
        });
        Err(error)
    }

    // ─── Inbound ─────────────────────────────────────────────

    /// Apply everything the channel delivered since the last call.
    /// Returns the number of channel events processed.
    pub fn pump(&self) -> usize {
        let events = self.transport.drain_inbound();
        let count = events.len();
        for event in events {
            self.apply_channel_event(event);
        }
        count
    }

    fn apply_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(streamed) => {
                let mut guard = self.inner.borrow_mut();
                let inner = &mut *guard;
                let ConnectionState::Connected { chat_id } = &inner.state else {
                    log::debug!("Dropping message {} received while not connected", streamed.id);
                    return;
                };
                if let Some(tag) = &streamed.chat_id {
                    if tag != chat_id {
                        log::debug!("Dropping message {} for inactive chat {}", streamed.id, tag);
                        return;
                    }
                }
                let id = streamed.id.clone();
                let outcome = inner.timeline.merge(streamed.into_message());
                if outcome == MergeOutcome::Suppressed {
                    log::debug!("Suppressed duplicate message {}", id);
                }
            }
            ChannelEvent::Closed { reason } => {
                let was_connected = self.with(|s| {
                    let was = matches!(s.state, ConnectionState::Connected { .. });
                    if was {
                        s.state = ConnectionState::Disconnected;
                        s.credential = None;
                    }
                    was
                });
                if was_connected {
                    log::warn!("Channel closed: {}", reason);
                    self.event_bus.emit(SessionEvent::ConnectionLost { reason });
                }
            }
        }
    }

    // ─── Mutations ───────────────────────────────────────────

    fn reject(&self, operation: &str, error: ChatError) -> ChatError {
        log::warn!("{} rejected: {}", operation, error);
        self.event_bus.emit(SessionEvent::Rejected {
            operation: operation.to_string(),
            message: error.to_string(),
        });
        error
    }

    /// Chat id and account of a connected session, or a NotReady rejection.
    fn require_connected(&self, operation: &str) -> Result<(String, String)> {
        let checked = {
            let inner = self.inner.borrow();
            match &inner.state {
                ConnectionState::Connected { chat_id } => Ok((chat_id.clone(), inner.account.clone())),
                ConnectionState::Connecting { chat_id } => {
                    Err(ChatError::NotReady(format!("still connecting to {}", chat_id)))
                }
                ConnectionState::Disconnected => Err(ChatError::NotReady("disconnected".to_string())),
            }
        };
        checked.map_err(|e| self.reject(operation, e))
    }

    /// Active chat id unless a reconnect is in flight.
    fn require_settled(&self, operation: &str) -> Result<String> {
        let checked = {
            let inner = self.inner.borrow();
            match (&inner.state, &inner.active_chat_id) {
                (ConnectionState::Connecting { chat_id }, _) => {
                    Err(ChatError::NotReady(format!("still connecting to {}", chat_id)))
                }
                (_, Some(chat_id)) => Ok(chat_id.clone()),
                (_, None) => Err(ChatError::NotReady("no active conversation".to_string())),
            }
        };
        checked.map_err(|e| self.reject(operation, e))
    }

    /// Send a user message. Whitespace-only content is ignored.
    /// Returns the id of the optimistic local entry.
    pub fn send(&self, content: &str) -> Result<Option<String>> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let (chat_id, account) = self.require_connected("send")?;
        let local = Message::user(&account, content);
        let outgoing = OutgoingMessage {
            chat_id,
            correlation_id: local.id.clone(),
            author: account,
            content: content.to_string(),
        };

        if let Err(e) = self.transport.send(&outgoing) {
            log::error!("Send failed: {}", e);
            self.transport.disconnect();
            self.with(|s| {
                s.state = ConnectionState::Disconnected;
                s.credential = None;
            });
            self.event_bus.emit(SessionEvent::TransportFailed {
                message: e.to_string(),
            });
            return Err(e);
        }

        let message_id = local.id.clone();
        let local = local.with_correlation(message_id.clone());
        self.with(|s| s.timeline.push_local(local));
        self.event_bus.emit(SessionEvent::MessageSent {
            message_id: message_id.clone(),
        });
        Ok(Some(message_id))
    }

    /// Delete a message and everything after it.
    /// The timeline is only touched once the history service confirms.
    /// Returns how many entries were removed.
    pub async fn delete(&self, message_id: &str) -> Result<usize> {
        let chat_id = self.require_settled("delete")?;
        if self.inner.borrow().timeline.position(message_id).is_none() {
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        }
        let generation = self.generation();

        if let Err(e) = self.history.delete_message(&chat_id, message_id).await {
            log::error!("Delete of {} in {} failed: {}", message_id, chat_id, e);
            self.event_bus.emit(SessionEvent::DeleteFailed {
                message_id: message_id.to_string(),
                message: e.to_string(),
            });
            return Err(ChatError::DeleteRejected {
                message_id: message_id.to_string(),
                message: e.to_string(),
            });
        }

        if !self.is_current(generation) {
            log::debug!("Delete of {} confirmed after conversation changed", message_id);
            return Ok(0);
        }

        let removed = self.with(|s| {
            let removed = s.timeline.truncate_from(message_id)?;
            let edited_gone = s
                .editing
                .as_ref()
                .is_some_and(|d| s.timeline.position(&d.message_id).is_none());
            if edited_gone {
                s.editing = None;
            }
            Some(removed)
        });
        let Some(removed) = removed else {
            log::warn!("{} was already gone when its delete was confirmed", message_id);
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        };
        log::info!("Truncated {} messages at {}", removed, message_id);
        self.event_bus.emit(SessionEvent::Truncated {
            message_id: message_id.to_string(),
            removed,
        });
        Ok(removed)
    }

    /// Enter editing mode for a user message. Returns the draft.
    pub fn begin_edit(&self, message_id: &str) -> Result<String> {
        self.require_settled("edit")?;
        let mut inner = self.inner.borrow_mut();

        let body = match inner.timeline.get(message_id) {
            None => return Err(ChatError::MessageNotFound(message_id.to_string())),
            Some(m) if !m.is_editable() => {
                return Err(ChatError::NotEditable(message_id.to_string()))
            }
            Some(m) => m.body.clone(),
        };

        if let Some(draft) = &inner.editing {
            return if draft.message_id == message_id {
                Ok(draft.draft.clone())
            } else {
                Err(ChatError::EditInProgress(draft.message_id.clone()))
            };
        }

        inner.editing = Some(EditDraft {
            message_id: message_id.to_string(),
            draft: body.clone(),
        });
        Ok(body)
    }

    pub fn update_draft(&self, text: &str) -> Result<()> {
        self.with(|s| match s.editing.as_mut() {
            Some(draft) => {
                draft.draft = text.to_string();
                Ok(())
            }
            None => Err(ChatError::NoActiveEdit),
        })
    }

    pub fn cancel_edit(&self) -> Option<EditDraft> {
        self.with(|s| s.editing.take())
    }

    /// Rewind the conversation to before the edited message and resend the
    /// draft. The draft is closed while the delete is in flight and reopened
    /// only if the delete fails and the message is still shown. Nothing is
    /// sent if the conversation changed meanwhile.
    pub async fn save_edit(&self) -> Result<Option<String>> {
        if self.inner.borrow().editing.is_none() {
            return Err(ChatError::NoActiveEdit);
        }
        self.require_connected("save edit")?;
        let draft = self
            .with(|s| s.editing.take())
            .ok_or(ChatError::NoActiveEdit)?;
        let generation = self.generation();

        if let Err(e) = self.delete(&draft.message_id).await {
            self.with(|s| {
                let reopen = s.generation == generation
                    && s.editing.is_none()
                    && s.timeline.position(&draft.message_id).is_some();
                if reopen {
                    s.editing = Some(draft);
                }
            });
            return Err(e);
        }

        if !self.is_current(generation) {
            log::debug!("Edit of {} dropped, conversation changed", draft.message_id);
            return Ok(None);
        }
        self.send(&draft.draft)
    }

    // ─── Account ─────────────────────────────────────────────

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let email = self.account();
        if email.is_empty() {
            return Err(ChatError::Auth("not signed in".to_string()));
        }
        self.history.list_conversations(&email).await.map_err(|e| {
            log::error!("Listing conversations failed: {}", e);
            e
        })
    }

    /// Tear everything down. The persisted chat id survives so the
    /// conversation can be resumed after signing in again.
    pub async fn logout(&self) {
        self.transport.disconnect();
        self.with(|s| {
            s.generation += 1;
            s.state = ConnectionState::Disconnected;
            s.active_chat_id = None;
            s.account.clear();
            s.credential = None;
            s.editing = None;
            s.timeline.clear();
        });
        if let Err(e) = self.store.clear_account().await {
            log::warn!("Could not clear stored account: {}", e);
        }
        log::info!("Logged out");
        self.event_bus.emit(SessionEvent::LoggedOut);
    }
}
