//! Main egui application: composes all panels and drives the session.
//!
//! Every frame: pump the channel into the timeline, drain session events
//! into `UiState`, collect finished async results, render, then dispatch
//! whatever the panels returned. Async work runs on `spawn_local` and
//! reports back through shared slots.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use egui::{self, CentralPanel, SidePanel};
use wasm_bindgen_futures::spawn_local;

use chat_core::event_bus::EventBus;
use chat_core::ports::AuthPort;
use chat_core::session::{SessionManager, SessionPorts};
use chat_core::store::SessionStore;
use chat_platform::storage::{auto_detect_storage, open_storage};
use chat_platform::{HttpBackend, WebSocketTransport};
use chat_types::{
    Result,
    config::{ClientConfig, StorageBackendType},
    conversation::{AuthResponse, ConversationSummary, UserProfile},
};
use chat_ui::panels::{
    ChatAction, LoginAction, SaveFeedback, SettingsAction, SidebarAction, chat_panel,
    login_panel, settings_panel, sidebar_panel,
};
use chat_ui::state::UiState;
use chat_ui::theme;

/// Shared slot an async task fills and the next frame takes
type Slot<T> = Rc<RefCell<Option<T>>>;

/// What survived the last page load
pub struct Bootstrap {
    config: ClientConfig,
    /// Where the config itself lives (always the best available backend)
    config_store: SessionStore,
    /// Where the session keeps token, profile and chat id
    store: SessionStore,
    account: Option<(String, UserProfile)>,
}

/// Restore config, then the account from the configured backend.
pub async fn bootstrap() -> Bootstrap {
    let config_store = SessionStore::new(auto_detect_storage());
    let config = match config_store.load_config().await {
        Ok(Some(config)) => {
            log::info!("Config restored from {}", config_store.backend_name());
            config
        }
        Ok(None) => ClientConfig::default(),
        Err(e) => {
            log::warn!("Stored config unreadable ({}), using defaults", e);
            ClientConfig::default()
        }
    };

    let store = match config.storage.backend {
        StorageBackendType::Memory => SessionStore::new(open_storage(&config.storage.backend)),
        StorageBackendType::Auto | StorageBackendType::LocalStorage => config_store.clone(),
    };

    let account = match (store.token().await, store.user().await) {
        (Ok(Some(token)), Ok(Some(user))) => Some((token, user)),
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("Stored account unreadable: {}", e);
            None
        }
        _ => None,
    };

    Bootstrap {
        config,
        config_store,
        store,
        account,
    }
}

/// The main application state
pub struct ChatApp {
    ui_state: UiState,
    config: ClientConfig,
    config_store: SessionStore,
    store: SessionStore,
    event_bus: EventBus,
    session: Rc<SessionManager>,
    backend: Rc<HttpBackend>,
    auth_result: Slot<Result<AuthResponse>>,
    conversations: Slot<Vec<ConversationSummary>>,
    save_feedback: Slot<SaveFeedback>,
    first_frame: bool,
}

impl ChatApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, boot: Bootstrap) -> Self {
        let Bootstrap {
            config,
            config_store,
            store,
            account,
        } = boot;

        let event_bus = EventBus::new();
        let backend = Rc::new(HttpBackend::new(config.backend.clone()));
        let transport = Rc::new(WebSocketTransport::new(config.backend.channel_url.clone()));
        let ports = SessionPorts {
            transport,
            history: backend.clone(),
            credentials: backend.clone(),
            store: store.clone(),
        };
        let session = Rc::new(SessionManager::new(ports, config.dedup, event_bus.clone()));
        log::info!(
            "Session ready (storage: {}, echo matching: {})",
            store.backend_name(),
            config.dedup.label()
        );

        let mut app = Self {
            ui_state: UiState::new(),
            config,
            config_store,
            store,
            event_bus,
            session,
            backend,
            auth_result: Rc::new(RefCell::new(None)),
            conversations: Rc::new(RefCell::new(None)),
            save_feedback: Rc::new(RefCell::new(None)),
            first_frame: true,
        };

        if let Some((token, user)) = account {
            log::info!("Restoring session for {}", user.email);
            app.backend.set_access_token(Some(token));
            app.session.set_account(&user);
            app.ui_state.sign_in(user);
            let session = app.session.clone();
            spawn_local(async move {
                if let Err(e) = session.resume().await {
                    log::warn!("Resume failed: {}", e);
                }
            });
        }

        app
    }

    /// Run a session operation in the background, logging its failure.
    fn spawn_session<F, Fut>(&self, ctx: &egui::Context, label: &'static str, op: F)
    where
        F: FnOnce(Rc<SessionManager>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let session = self.session.clone();
        let ctx = ctx.clone();
        spawn_local(async move {
            if let Err(e) = op(session).await {
                log::warn!("{} failed: {}", label, e);
            }
            ctx.request_repaint();
        });
    }

    fn refresh_conversations(&self, ctx: &egui::Context) {
        let session = self.session.clone();
        let slot = self.conversations.clone();
        let ctx = ctx.clone();
        spawn_local(async move {
            match session.list_conversations().await {
                Ok(list) => {
                    *slot.borrow_mut() = Some(list);
                    ctx.request_repaint();
                }
                Err(e) => log::warn!("Could not refresh conversations: {}", e),
            }
        });
    }

    fn save_config(&self, ctx: &egui::Context) {
        let store = self.config_store.clone();
        let config = self.config.clone();
        let slot = self.save_feedback.clone();
        let ctx = ctx.clone();
        spawn_local(async move {
            let feedback = match store.save_config(&config).await {
                Ok(()) => {
                    log::info!("Config saved to {}", store.backend_name());
                    SaveFeedback {
                        message: "Saved".to_string(),
                        success: true,
                    }
                }
                Err(e) => {
                    log::error!("Config save failed: {}", e);
                    SaveFeedback {
                        message: format!("Save failed: {}", e),
                        success: false,
                    }
                }
            };
            *slot.borrow_mut() = Some(feedback);
            ctx.request_repaint();
        });
    }

    // ─── Async results ───────────────────────────────────────

    fn collect_results(&mut self, ctx: &egui::Context) {
        let auth = self.auth_result.borrow_mut().take();
        match auth {
            Some(Ok(response)) => self.signed_in(response, ctx),
            Some(Err(e)) => {
                log::warn!("Sign-in failed: {}", e);
                self.ui_state.login.pending = false;
                self.ui_state.login.error = Some(e.to_string());
            }
            None => {}
        }

        if let Some(list) = self.conversations.borrow_mut().take() {
            self.ui_state.conversations = list;
        }

        if self.ui_state.signed_in.is_some() && self.ui_state.conversations_stale {
            self.ui_state.conversations_stale = false;
            self.refresh_conversations(ctx);
        }
    }

    fn signed_in(&mut self, response: AuthResponse, ctx: &egui::Context) {
        let AuthResponse {
            access_token, user, ..
        } = response;
        log::info!("Signed in as {}", user.email);

        self.backend.set_access_token(Some(access_token.clone()));
        self.session.set_account(&user);
        self.ui_state.sign_in(user.clone());

        let store = self.store.clone();
        self.spawn_session(ctx, "resume", move |session| async move {
            if let Err(e) = store.save_account(&access_token, &user).await {
                log::warn!("Could not persist account: {}", e);
            }
            session.resume().await
        });
    }

    // ─── Dispatch ────────────────────────────────────────────

    fn dispatch_login(&self, action: LoginAction, ctx: &egui::Context) {
        let backend = self.backend.clone();
        let slot = self.auth_result.clone();
        let ctx = ctx.clone();
        spawn_local(async move {
            let result = match action {
                LoginAction::Login { email, password } => backend.login(&email, &password).await,
                LoginAction::Register {
                    email,
                    password,
                    full_name,
                } => backend.register(&email, &password, &full_name).await,
            };
            *slot.borrow_mut() = Some(result);
            ctx.request_repaint();
        });
    }

    fn dispatch_chat(&mut self, action: ChatAction, ctx: &egui::Context) {
        match action {
            ChatAction::Send(text) => {
                if let Err(e) = self.session.send(&text) {
                    log::warn!("Send failed: {}", e);
                    self.ui_state.input_text = text;
                }
            }
            ChatAction::BeginEdit(message_id) => match self.session.begin_edit(&message_id) {
                Ok(draft) => self.ui_state.edit_buffer = draft,
                Err(e) => log::warn!("Cannot edit {}: {}", message_id, e),
            },
            ChatAction::UpdateDraft(text) => {
                if let Err(e) = self.session.update_draft(&text) {
                    log::warn!("Draft update ignored: {}", e);
                }
            }
            ChatAction::SaveEdit => {
                self.spawn_session(ctx, "save edit", |session| async move {
                    session.save_edit().await.map(|_| ())
                });
            }
            ChatAction::CancelEdit => {
                self.session.cancel_edit();
                self.ui_state.edit_buffer.clear();
            }
            ChatAction::Delete(message_id) => {
                self.spawn_session(ctx, "delete", move |session| async move {
                    session.delete(&message_id).await.map(|_| ())
                });
            }
            ChatAction::Retry => {
                self.spawn_session(ctx, "retry", |session| async move { session.retry().await });
            }
        }
    }

    fn dispatch_sidebar(&mut self, action: SidebarAction, ctx: &egui::Context) {
        match action {
            SidebarAction::NewConversation => {
                self.spawn_session(ctx, "new conversation", |session| async move {
                    session.new_conversation().await.map(|_| ())
                });
            }
            SidebarAction::Switch(chat_id) => {
                self.spawn_session(ctx, "switch conversation", move |session| async move {
                    session.switch_conversation(&chat_id).await
                });
            }
            SidebarAction::Refresh => {
                self.ui_state.conversations_stale = true;
            }
            SidebarAction::ToggleSettings => {
                self.ui_state.show_settings = !self.ui_state.show_settings;
                self.save_feedback.borrow_mut().take();
            }
            SidebarAction::Logout => {
                self.backend.set_access_token(None);
                self.spawn_session(ctx, "logout", |session| async move {
                    session.logout().await;
                    Ok(())
                });
            }
        }
    }

    fn apply_settings(&mut self, action: SettingsAction, ctx: &egui::Context) {
        match action {
            SettingsAction::None => {}
            SettingsAction::Changed => {
                if self.session.dedup_policy() != self.config.dedup {
                    log::info!("Echo matching: {}", self.config.dedup.label());
                    self.session.set_dedup_policy(self.config.dedup);
                }
            }
            SettingsAction::SaveClicked => {
                self.session.set_dedup_policy(self.config.dedup);
                self.save_config(ctx);
            }
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.first_frame {
            theme::apply_theme(ctx);
            self.first_frame = false;
        }

        // Channel traffic arrives without any input event
        if self.session.pump() > 0 {
            ctx.request_repaint();
        }

        let events = self.event_bus.drain();
        if !events.is_empty() {
            self.ui_state.process_events(events);
            ctx.request_repaint();
        }

        self.collect_results(ctx);

        if self.ui_state.is_connected() || self.ui_state.is_connecting() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        // ── Login ────────────────────────────────────────────
        if self.ui_state.signed_in.is_none() {
            let mut login = None;
            CentralPanel::default().show(ctx, |ui| {
                login = login_panel(ui, &mut self.ui_state.login);
            });
            if let Some(action) = login {
                self.dispatch_login(action, ctx);
            }
            return;
        }

        // ── Sidebar ──────────────────────────────────────────
        let active_chat_id = self.session.active_chat_id();
        let mut sidebar = None;
        SidePanel::left("sidebar")
            .exact_width(theme::SIDEBAR_WIDTH)
            .resizable(false)
            .show(ctx, |ui| {
                sidebar = sidebar_panel(ui, &self.ui_state, active_chat_id.as_deref());
            });
        if let Some(action) = sidebar {
            self.dispatch_sidebar(action, ctx);
        }

        // ── Settings side panel ──────────────────────────────
        if self.ui_state.show_settings {
            let feedback = self.save_feedback.borrow().clone();
            let mut settings = SettingsAction::None;
            SidePanel::right("settings_panel")
                .min_width(280.0)
                .max_width(350.0)
                .show(ctx, |ui| {
                    settings = settings_panel(ui, &mut self.config, feedback.as_ref());
                });
            self.apply_settings(settings, ctx);
        }

        // ── Conversation ─────────────────────────────────────
        let title = match &active_chat_id {
            Some(chat_id) => self.ui_state.conversation_title(chat_id),
            None => "New chat".to_string(),
        };
        let messages = self.session.snapshot();
        let editing = self.session.editing();
        let mut chat = None;
        CentralPanel::default().show(ctx, |ui| {
            chat = chat_panel(ui, &mut self.ui_state, &title, &messages, editing.as_ref());
        });
        if let Some(action) = chat {
            self.dispatch_chat(action, ctx);
        }
    }
}
