#[cfg(test)]
mod tests {
    use crate::event_bus::EventBus;
    use crate::ports::*;
    use crate::session::{ConnectionState, SessionManager, SessionPorts};
    use crate::store::*;
    use crate::timeline::{MergeOutcome, Timeline};
    use chat_types::{
        ChatError,
        config::{ClientConfig, DedupPolicy},
        conversation::{ConversationSummary, Credential, UserProfile},
        event::{ChannelEvent, SessionEvent},
        message::*,
    };
    use async_trait::async_trait;
    use futures::channel::oneshot;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    // ─── Fakes ───────────────────────────────────────────────

    #[derive(Default)]
    struct FakeTransport {
        connected: Cell<bool>,
        fail_connect: Cell<bool>,
        fail_send: Cell<bool>,
        /// (token, chat id) of every successful connect
        connects: RefCell<Vec<(String, String)>>,
        disconnects: Cell<usize>,
        sent: RefCell<Vec<OutgoingMessage>>,
        inbound: EventBus<ChannelEvent>,
    }

    impl FakeTransport {
        fn deliver(&self, event: ChannelEvent) {
            self.inbound.emit(event);
        }
    }

    #[async_trait(?Send)]
    impl TransportPort for FakeTransport {
        async fn connect(&self, credential: &Credential, context: &ClientContext) -> chat_types::Result<()> {
            if self.fail_connect.get() {
                return Err(ChatError::Transport("connection refused".to_string()));
            }
            self.connects
                .borrow_mut()
                .push((credential.token.clone(), context.chat_id.clone()));
            self.connected.set(true);
            Ok(())
        }

        fn disconnect(&self) {
            self.disconnects.set(self.disconnects.get() + 1);
            self.connected.set(false);
            self.inbound.clear();
        }

        fn send(&self, message: &OutgoingMessage) -> chat_types::Result<()> {
            if self.fail_send.get() || !self.connected.get() {
                return Err(ChatError::Transport("socket closed".to_string()));
            }
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }

        fn drain_inbound(&self) -> Vec<ChannelEvent> {
            self.inbound.drain()
        }

        fn is_connected(&self) -> bool {
            self.connected.get()
        }
    }

    #[derive(Default)]
    struct FakeHistory {
        pages: RefCell<HashMap<String, Vec<HistoryRecord>>>,
        /// Fetches for these chats wait until the sender fires
        gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
        fail_fetch: Cell<bool>,
        fail_delete: Cell<bool>,
        /// Deletes of these message ids wait until the sender fires
        delete_gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
        fetches: RefCell<Vec<String>>,
        deleted: RefCell<Vec<(String, String)>>,
        conversations: RefCell<Vec<ConversationSummary>>,
        listed_for: RefCell<Vec<String>>,
    }

    impl FakeHistory {
        fn set_page(&self, chat_id: &str, records: Vec<HistoryRecord>) {
            self.pages.borrow_mut().insert(chat_id.to_string(), records);
        }

        fn gate(&self, chat_id: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.borrow_mut().insert(chat_id.to_string(), rx);
            tx
        }
    }

    #[async_trait(?Send)]
    impl HistoryPort for FakeHistory {
        async fn fetch_messages(&self, chat_id: &str) -> chat_types::Result<HistoryPage> {
            self.fetches.borrow_mut().push(chat_id.to_string());
            let gate = self.gates.borrow_mut().remove(chat_id);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail_fetch.get() {
                return Err(ChatError::History("HTTP 500".to_string()));
            }
            Ok(HistoryPage {
                messages: self.pages.borrow().get(chat_id).cloned(),
            })
        }

        async fn delete_message(&self, chat_id: &str, message_id: &str) -> chat_types::Result<()> {
            let gate = self.delete_gates.borrow_mut().remove(message_id);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail_delete.get() {
                return Err(ChatError::History("HTTP 404".to_string()));
            }
            self.deleted
                .borrow_mut()
                .push((chat_id.to_string(), message_id.to_string()));
            Ok(())
        }

        async fn list_conversations(&self, email: &str) -> chat_types::Result<Vec<ConversationSummary>> {
            self.listed_for.borrow_mut().push(email.to_string());
            Ok(self.conversations.borrow().clone())
        }
    }

    #[derive(Default)]
    struct FakeCredentials {
        issued: Cell<u32>,
        fail: Cell<bool>,
        /// Consumed one per issue; the matching issue waits on it
        gates: RefCell<VecDeque<Option<oneshot::Receiver<()>>>>,
    }

    #[async_trait(?Send)]
    impl CredentialPort for FakeCredentials {
        async fn issue_credential(&self) -> chat_types::Result<Credential> {
            let n = self.issued.get() + 1;
            self.issued.set(n);
            let gate = self.gates.borrow_mut().pop_front().flatten();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.fail.get() {
                return Err(ChatError::Network("credential endpoint down".to_string()));
            }
            Ok(Credential {
                token: format!("tok-{}", n),
            })
        }
    }

    #[derive(Default)]
    struct MockStorage {
        data: RefCell<HashMap<String, Vec<u8>>>,
    }

    #[async_trait(?Send)]
    impl StoragePort for MockStorage {
        async fn get(&self, key: &str) -> chat_types::Result<Option<Vec<u8>>> {
            Ok(self.data.borrow().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &[u8]) -> chat_types::Result<()> {
            self.data.borrow_mut().insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn delete(&self, key: &str) -> chat_types::Result<()> {
            self.data.borrow_mut().remove(key);
            Ok(())
        }

        fn backend_name(&self) -> &str {
            "mock"
        }
    }

    struct Harness {
        session: Rc<SessionManager>,
        transport: Rc<FakeTransport>,
        history: Rc<FakeHistory>,
        credentials: Rc<FakeCredentials>,
        storage: Rc<MockStorage>,
        events: EventBus<SessionEvent>,
    }

    impl Harness {
        fn bodies(&self) -> Vec<String> {
            self.session.snapshot().into_iter().map(|m| m.body).collect()
        }

        fn ids(&self) -> Vec<String> {
            self.session.snapshot().into_iter().map(|m| m.id).collect()
        }

        fn stored(&self, key: &str) -> Option<String> {
            self.storage
                .data
                .borrow()
                .get(key)
                .map(|v| String::from_utf8(v.clone()).unwrap())
        }
    }

    fn ada() -> UserProfile {
        UserProfile {
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            avatar: None,
        }
    }

    fn harness_with(policy: DedupPolicy) -> Harness {
        let transport = Rc::new(FakeTransport::default());
        let history = Rc::new(FakeHistory::default());
        let credentials = Rc::new(FakeCredentials::default());
        let storage = Rc::new(MockStorage::default());
        let events = EventBus::new();
        let ports = SessionPorts {
            transport: transport.clone(),
            history: history.clone(),
            credentials: credentials.clone(),
            store: SessionStore::new(storage.clone()),
        };
        let session = Rc::new(SessionManager::new(ports, policy, events.clone()));
        session.set_account(&ada());
        Harness {
            session,
            transport,
            history,
            credentials,
            storage,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(DedupPolicy::ContentEquality)
    }

    fn record(id: &str, role: MessageKind, content: &str) -> HistoryRecord {
        HistoryRecord {
            message_id: id.to_string(),
            role,
            content: content.to_string(),
            timestamp: "2024-05-01T10:00:00".to_string(),
        }
    }

    fn streamed(id: &str, role: MessageKind, content: &str) -> StreamedMessage {
        StreamedMessage {
            id: id.to_string(),
            role,
            author: None,
            content: content.to_string(),
            created_at: None,
            chat_id: None,
            correlation_id: None,
        }
    }

    fn assistant_event(id: &str, content: &str) -> ChannelEvent {
        ChannelEvent::Message(streamed(id, MessageKind::Assistant, content))
    }

    fn echo_event(id: &str, content: &str, correlation: Option<&str>) -> ChannelEvent {
        let mut msg = streamed(id, MessageKind::User, content);
        msg.correlation_id = correlation.map(str::to_string);
        ChannelEvent::Message(msg)
    }

    /// Connected to `chat_id` with the given stored history.
    fn connected_with(h: &Harness, chat_id: &str, records: Vec<HistoryRecord>) {
        h.history.set_page(chat_id, records);
        block_on(h.session.switch_conversation(chat_id)).unwrap();
        h.events.drain();
    }

    // ─── EventBus Tests ──────────────────────────────────────

    #[test]
    fn test_event_bus_new_is_empty() {
        let bus: EventBus = EventBus::new();
        assert!(!bus.has_pending());
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_event_bus_emit_and_drain_in_order() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::LoggedOut);
        bus.emit(SessionEvent::Connected { chat_id: "c1".to_string() });
        assert_eq!(bus.len(), 2);

        let events = bus.drain();
        assert_eq!(events[0], SessionEvent::LoggedOut);
        assert_eq!(events[1], SessionEvent::Connected { chat_id: "c1".to_string() });
        assert!(!bus.has_pending());
    }

    #[test]
    fn test_event_bus_clone_shares_state() {
        let bus1: EventBus<ChannelEvent> = EventBus::new();
        let bus2 = bus1.clone();
        bus1.emit(assistant_event("a1", "hi"));
        assert!(bus2.has_pending());
        assert_eq!(bus2.drain().len(), 1);
        assert!(!bus1.has_pending());
    }

    #[test]
    fn test_event_bus_clear() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::LoggedOut);
        bus.clear();
        assert!(bus.drain().is_empty());
    }

    // ─── Timeline Tests ──────────────────────────────────────

    fn user_msg(id: &str, body: &str) -> Message {
        Message::user("ada", body).with_id(id)
    }

    #[test]
    fn test_timeline_merge_into_empty_appends() {
        let mut timeline = Timeline::default();
        assert_eq!(timeline.merge(Message::assistant("a1", "hi")), MergeOutcome::Appended);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_timeline_distinct_events_are_all_kept() {
        let mut timeline = Timeline::new(DedupPolicy::ContentEquality);
        for i in 0..50 {
            timeline.merge(Message::assistant(format!("m{:03}", i), format!("body {}", i)));
        }
        assert_eq!(timeline.len(), 50);
        let ids: Vec<&str> = timeline.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids[0], "m000");
        assert_eq!(ids[49], "m049");
    }

    #[test]
    fn test_timeline_same_id_as_last_updates_in_place() {
        let mut timeline = Timeline::default();
        timeline.push_local(user_msg("u1", "hello"));
        timeline.merge(Message::assistant("a1", "Hel"));

        let outcome = timeline.merge(Message::assistant("a1", "Hello there"));
        assert_eq!(outcome, MergeOutcome::Updated { index: 1 });
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.messages()[1].body, "Hello there");
        assert_eq!(timeline.messages()[0].body, "hello");
    }

    #[test]
    fn test_timeline_only_last_entry_is_updated() {
        let mut timeline = Timeline::default();
        timeline.merge(Message::assistant("a1", "first"));
        timeline.merge(Message::assistant("a2", "second"));

        let outcome = timeline.merge(Message::assistant("a1", "rewritten"));
        assert_eq!(outcome, MergeOutcome::Appended);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_timeline_content_duplicate_suppressed() {
        let mut timeline = Timeline::new(DedupPolicy::ContentEquality);
        timeline.push_local(user_msg("local-1", "hello"));

        let outcome = timeline.merge(user_msg("server-1", "hello"));
        assert_eq!(outcome, MergeOutcome::Suppressed);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].id, "local-1");
    }

    #[test]
    fn test_timeline_correlation_reconciles_local_entry() {
        let mut timeline = Timeline::new(DedupPolicy::CorrelationToken);
        timeline.push_local(user_msg("local-1", "hello").with_correlation("local-1"));
        timeline.merge(Message::assistant("a1", "hi"));

        let echo = user_msg("server-1", "hello").with_correlation("local-1");
        assert_eq!(timeline.merge(echo), MergeOutcome::Reconciled { index: 0 });
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.messages()[0].id, "server-1");
    }

    #[test]
    fn test_timeline_correlation_keeps_same_text_messages() {
        let mut timeline = Timeline::new(DedupPolicy::CorrelationToken);
        timeline.push_local(user_msg("u1", "ok"));
        timeline.merge(Message::assistant("a1", "sure"));

        assert_eq!(timeline.merge(user_msg("u2", "ok")), MergeOutcome::Appended);
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn test_timeline_update_keeps_correlation() {
        let mut timeline = Timeline::new(DedupPolicy::CorrelationToken);
        timeline.push_local(user_msg("u1", "hi").with_correlation("k1"));
        timeline.merge(user_msg("u1", "hi!"));
        assert_eq!(timeline.messages()[0].correlation_id.as_deref(), Some("k1"));
    }

    #[test]
    fn test_timeline_replay_history_goes_first() {
        let mut timeline = Timeline::default();
        timeline.push_local(user_msg("live", "typed while loading"));

        let placed = timeline.replay_history(vec![
            user_msg("h1", "old question"),
            Message::assistant("h2", "old answer"),
        ]);
        assert_eq!(placed, 2);
        let ids: Vec<&str> = timeline.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2", "live"]);
    }

    #[test]
    fn test_timeline_replay_history_skips_known_ids() {
        let mut timeline = Timeline::default();
        timeline.merge(Message::assistant("h2", "old answer"));
        timeline.replay_history(vec![user_msg("h1", "q"), Message::assistant("h2", "old answer")]);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn test_timeline_truncate_from_index() {
        let mut timeline = Timeline::default();
        for i in 0..5 {
            timeline.push_local(user_msg(&format!("m{}", i), &format!("b{}", i)));
        }
        assert_eq!(timeline.truncate_from("m3"), Some(2));
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.messages().last().unwrap().id, "m2");
    }

    #[test]
    fn test_timeline_truncate_first_empties() {
        let mut timeline = Timeline::default();
        timeline.push_local(user_msg("a", "hello"));
        timeline.push_local(Message::assistant("b", "hi there"));
        assert_eq!(timeline.truncate_from("a"), Some(2));
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_timeline_truncate_missing_is_none() {
        let mut timeline = Timeline::default();
        timeline.push_local(user_msg("a", "hello"));
        assert_eq!(timeline.truncate_from("zzz"), None);
        assert_eq!(timeline.len(), 1);
    }

    // ─── SessionStore Tests ──────────────────────────────────

    #[test]
    fn test_store_account_roundtrip() {
        let store = SessionStore::new(Rc::new(MockStorage::default()));
        block_on(async {
            assert!(store.token().await.unwrap().is_none());
            store.save_account("jwt", &ada()).await.unwrap();
            assert_eq!(store.token().await.unwrap().as_deref(), Some("jwt"));
            assert_eq!(store.user().await.unwrap(), Some(ada()));
        });
    }

    #[test]
    fn test_store_clear_account_keeps_chat_id() {
        let store = SessionStore::new(Rc::new(MockStorage::default()));
        block_on(async {
            store.save_account("jwt", &ada()).await.unwrap();
            store.set_last_chat_id("c1").await.unwrap();
            store.clear_account().await.unwrap();
            assert!(store.token().await.unwrap().is_none());
            assert!(store.user().await.unwrap().is_none());
            assert_eq!(store.last_chat_id().await.unwrap().as_deref(), Some("c1"));
        });
    }

    #[test]
    fn test_store_empty_chat_id_is_none() {
        let store = SessionStore::new(Rc::new(MockStorage::default()));
        block_on(async {
            store.set_last_chat_id("").await.unwrap();
            assert!(store.last_chat_id().await.unwrap().is_none());
        });
    }

    #[test]
    fn test_store_config_roundtrip() {
        let store = SessionStore::new(Rc::new(MockStorage::default()));
        let mut config = ClientConfig::default();
        config.dedup = DedupPolicy::CorrelationToken;
        block_on(async {
            assert!(store.load_config().await.unwrap().is_none());
            store.save_config(&config).await.unwrap();
            let loaded = store.load_config().await.unwrap().unwrap();
            assert_eq!(loaded.dedup, DedupPolicy::CorrelationToken);
        });
    }

    #[test]
    fn test_store_corrupt_user_is_error() {
        let storage = Rc::new(MockStorage::default());
        block_on(storage.set(USER_KEY, b"{not json")).unwrap();
        let store = SessionStore::new(storage);
        let err = block_on(store.user()).unwrap_err();
        assert!(matches!(err, ChatError::Serialization(_)));
    }

    // ─── Connection Tests ────────────────────────────────────

    #[test]
    fn test_session_initial_state() {
        let h = harness();
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(h.session.active_chat_id().is_none());
        assert!(h.session.snapshot().is_empty());
        assert!(!h.session.has_credential());
        assert!(!h.session.is_ready());
    }

    #[test]
    fn test_new_conversation_connects_without_fetching() {
        let h = harness();
        let chat_id = block_on(h.session.new_conversation()).unwrap();

        assert_eq!(h.session.state(), ConnectionState::Connected { chat_id: chat_id.clone() });
        assert!(h.session.has_credential());
        assert!(h.history.fetches.borrow().is_empty());
        assert_eq!(*h.transport.connects.borrow(), vec![("tok-1".to_string(), chat_id.clone())]);
        assert_eq!(h.stored(CHAT_ID_KEY), Some(chat_id));
    }

    #[test]
    fn test_new_conversation_ids_are_fresh() {
        let h = harness();
        let first = block_on(h.session.new_conversation()).unwrap();
        let second = block_on(h.session.new_conversation()).unwrap();
        assert_ne!(first, second);
        assert_eq!(h.session.active_chat_id(), Some(second));
    }

    #[test]
    fn test_switch_conversation_replays_history() {
        let h = harness();
        h.history.set_page("c1", vec![
            record("m1", MessageKind::User, "hello"),
            record("m2", MessageKind::Assistant, "hi there"),
        ]);

        block_on(h.session.switch_conversation("c1")).unwrap();

        assert_eq!(h.bodies(), vec!["hello", "hi there"]);
        let snapshot = h.session.snapshot();
        assert_eq!(snapshot[0].author, Author::user("ada@example.com"));
        assert_eq!(snapshot[1].kind(), MessageKind::Assistant);

        let events = h.events.drain();
        assert_eq!(events[0], SessionEvent::Connecting { chat_id: "c1".to_string() });
        assert!(events.contains(&SessionEvent::HistoryLoaded { chat_id: "c1".to_string(), count: 2 }));
        assert!(events.contains(&SessionEvent::Connected { chat_id: "c1".to_string() }));
    }

    #[test]
    fn test_switch_tears_down_and_clears() {
        let h = harness();
        connected_with(&h, "c1", vec![record("m1", MessageKind::User, "hello")]);
        let disconnects = h.transport.disconnects.get();

        block_on(h.session.switch_conversation("c2")).unwrap();

        assert!(h.session.snapshot().is_empty());
        assert_eq!(h.transport.disconnects.get(), disconnects + 1);
        assert_eq!(h.session.active_chat_id().as_deref(), Some("c2"));
        assert_eq!(h.stored(CHAT_ID_KEY).as_deref(), Some("c2"));
        // fresh credential per connection
        let connects = h.transport.connects.borrow();
        assert_eq!(connects[1], ("tok-2".to_string(), "c2".to_string()));
    }

    #[test]
    fn test_history_failure_means_empty_timeline() {
        let h = harness();
        h.history.fail_fetch.set(true);

        block_on(h.session.switch_conversation("c1")).unwrap();

        assert!(h.session.snapshot().is_empty());
        assert!(h.session.is_ready());
        let events = h.events.drain();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::HistoryFailed { chat_id, .. } if chat_id == "c1")));
    }

    #[test]
    fn test_credential_failure_leaves_disconnected() {
        let h = harness();
        h.credentials.fail.set(true);

        let err = block_on(h.session.switch_conversation("c1")).unwrap_err();

        assert!(matches!(err, ChatError::Network(_)));
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(h.transport.connects.borrow().is_empty());
        let events = h.events.drain();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::TransportFailed { .. })));
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        let h = harness();
        h.transport.fail_connect.set(true);

        let err = block_on(h.session.connect("c1")).unwrap_err();

        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(!h.session.has_credential());
    }

    #[test]
    fn test_retry_after_failure() {
        let h = harness();
        h.transport.fail_connect.set(true);
        let _ = block_on(h.session.connect("c1"));

        h.transport.fail_connect.set(false);
        block_on(h.session.retry()).unwrap();

        assert_eq!(h.session.state(), ConnectionState::Connected { chat_id: "c1".to_string() });
        assert_eq!(h.transport.connects.borrow()[0].0, "tok-2");
    }

    // ─── Resume Tests ────────────────────────────────────────

    #[test]
    fn test_resume_switches_to_persisted_chat() {
        let h = harness();
        block_on(h.storage.set(CHAT_ID_KEY, b"c9")).unwrap();
        h.history.set_page("c9", vec![record("m1", MessageKind::User, "earlier")]);

        block_on(h.session.resume()).unwrap();

        assert_eq!(h.session.active_chat_id().as_deref(), Some("c9"));
        assert_eq!(h.bodies(), vec!["earlier"]);
    }

    #[test]
    fn test_resume_without_persisted_chat_starts_new() {
        let h = harness();
        block_on(h.session.resume()).unwrap();

        let active = h.session.active_chat_id().unwrap();
        assert_eq!(h.stored(CHAT_ID_KEY), Some(active));
        assert!(h.session.is_ready());
    }

    #[test]
    fn test_resume_is_noop_when_in_sync() {
        let h = harness();
        connected_with(&h, "c1", vec![]);

        block_on(h.session.resume()).unwrap();

        assert_eq!(h.transport.connects.borrow().len(), 1);
    }

    #[test]
    fn test_resume_reconnects_when_channel_went_away_silently() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        h.transport.connected.set(false);

        block_on(h.session.resume()).unwrap();

        assert!(h.session.is_ready());
        assert_eq!(h.transport.connects.borrow().len(), 2);
    }

    #[test]
    fn test_resume_reconnects_after_drop() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        h.transport.deliver(ChannelEvent::Closed { reason: "server restart".to_string() });
        h.session.pump();

        block_on(h.session.resume()).unwrap();

        assert!(h.session.is_ready());
        assert_eq!(h.transport.connects.borrow().len(), 2);
    }

    // ─── Inbound Tests ───────────────────────────────────────

    #[test]
    fn test_pump_streams_assistant_reply() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        h.session.send("hello").unwrap();

        h.transport.deliver(assistant_event("a1", "Hel"));
        h.transport.deliver(assistant_event("a1", "Hello"));
        h.transport.deliver(assistant_event("a1", "Hello!"));
        assert_eq!(h.session.pump(), 3);

        assert_eq!(h.bodies(), vec!["hello", "Hello!"]);
    }

    #[test]
    fn test_pump_suppresses_own_echo() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        h.session.send("hello").unwrap();

        h.transport.deliver(echo_event("srv-1", "hello", None));
        h.session.pump();

        assert_eq!(h.session.message_count(), 1);
    }

    #[test]
    fn test_pump_distinct_events_no_loss() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        for i in 0..20 {
            h.transport.deliver(assistant_event(&format!("a{:02}", i), &format!("reply {}", i)));
        }
        h.session.pump();
        assert_eq!(h.session.message_count(), 20);
    }

    #[test]
    fn test_pump_drops_messages_for_other_chat() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        let mut stray = streamed("a1", MessageKind::Assistant, "not yours");
        stray.chat_id = Some("c0".to_string());
        h.transport.deliver(ChannelEvent::Message(stray));
        h.session.pump();
        assert!(h.session.snapshot().is_empty());
    }

    #[test]
    fn test_pump_ignores_messages_when_disconnected() {
        let h = harness();
        h.transport.deliver(assistant_event("a1", "orphan"));
        h.session.pump();
        assert!(h.session.snapshot().is_empty());
    }

    #[test]
    fn test_channel_close_disconnects() {
        let h = harness();
        connected_with(&h, "c1", vec![]);

        h.transport.deliver(ChannelEvent::Closed { reason: "socket reset".to_string() });
        h.session.pump();

        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(!h.session.has_credential());
        assert_eq!(h.events.drain(), vec![SessionEvent::ConnectionLost { reason: "socket reset".to_string() }]);
    }

    // ─── Send Tests ──────────────────────────────────────────

    #[test]
    fn test_send_whitespace_is_noop() {
        let h = harness();
        connected_with(&h, "c1", vec![record("m1", MessageKind::User, "hello")]);

        assert_eq!(h.session.send("   \n\t").unwrap(), None);
        assert_eq!(h.session.send("").unwrap(), None);

        assert_eq!(h.session.message_count(), 1);
        assert!(h.transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_send_dispatches_once_and_appends_optimistically() {
        let h = harness();
        connected_with(&h, "c1", vec![]);

        let id = h.session.send("  hello  ").unwrap().unwrap();

        let sent = h.transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, "c1");
        assert_eq!(sent[0].content, "hello");
        assert_eq!(sent[0].author, "ada@example.com");
        assert_eq!(sent[0].correlation_id, id);

        let snapshot = h.session.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].kind(), MessageKind::User);
        assert_eq!(snapshot[0].body, "hello");
        assert_eq!(h.events.drain(), vec![SessionEvent::MessageSent { message_id: id }]);
    }

    #[test]
    fn test_send_before_connect_is_rejected() {
        let h = harness();
        let err = h.session.send("hello").unwrap_err();

        assert!(matches!(err, ChatError::NotReady(_)));
        assert!(h.session.snapshot().is_empty());
        assert!(matches!(h.events.drain().as_slice(), [SessionEvent::Rejected { .. }]));
    }

    #[test]
    fn test_send_failure_disconnects_without_append() {
        let h = harness();
        connected_with(&h, "c1", vec![]);
        h.transport.fail_send.set(true);
        let disconnects = h.transport.disconnects.get();

        assert!(h.session.send("hello").is_err());

        assert!(h.session.snapshot().is_empty());
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert_eq!(h.transport.disconnects.get(), disconnects + 1);
        assert!(h.events.drain().iter().any(|e| matches!(e, SessionEvent::TransportFailed { .. })));
    }

    #[test]
    fn test_operations_rejected_while_connecting() {
        let h = harness();
        connected_with(&h, "c1", vec![record("m1", MessageKind::User, "hello")]);
        let (release, gate) = oneshot::channel();
        h.credentials.gates.borrow_mut().push_back(Some(gate));

        let mut pool = LocalPool::new();
        let session = h.session.clone();
        pool.spawner()
            .spawn_local(async move {
                let _ = session.switch_conversation("c2").await;
            })
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(h.session.state(), ConnectionState::Connecting { chat_id: "c2".to_string() });
        assert!(matches!(h.session.send("hi"), Err(ChatError::NotReady(_))));
        assert!(matches!(h.session.begin_edit("m1"), Err(ChatError::NotReady(_))));
        assert!(matches!(block_on(h.session.delete("m1")), Err(ChatError::NotReady(_))));
        assert!(h.transport.sent.borrow().is_empty());

        release.send(()).unwrap();
        pool.run_until_stalled();
        assert!(h.session.is_ready());
    }

    #[test]
    fn test_correlation_policy_keeps_repeated_text() {
        let h = harness_with(DedupPolicy::CorrelationToken);
        connected_with(&h, "c1", vec![]);

        let first = h.session.send("ok").unwrap().unwrap();
        h.transport.deliver(echo_event("srv-1", "ok", Some(&first)));
        h.transport.deliver(assistant_event("a1", "noted"));
        h.session.pump();
        let second = h.session.send("ok").unwrap().unwrap();
        h.transport.deliver(echo_event("srv-2", "ok", Some(&second)));
        h.session.pump();

        assert_eq!(h.bodies(), vec!["ok", "noted", "ok"]);
        assert_eq!(h.ids(), vec!["srv-1", "a1", "srv-2"]);
    }

    #[test]
    fn test_set_dedup_policy_switches_merge() {
        let h = harness();
        assert_eq!(h.session.dedup_policy(), DedupPolicy::ContentEquality);
        h.session.set_dedup_policy(DedupPolicy::CorrelationToken);
        assert_eq!(h.session.dedup_policy(), DedupPolicy::CorrelationToken);
    }

    // ─── Delete Tests ────────────────────────────────────────

    fn four_messages() -> Vec<HistoryRecord> {
        vec![
            record("m0", MessageKind::User, "q1"),
            record("m1", MessageKind::Assistant, "a1"),
            record("m2", MessageKind::User, "q2"),
            record("m3", MessageKind::Assistant, "a2"),
        ]
    }

    #[test]
    fn test_delete_truncates_at_index() {
        let h = harness();
        connected_with(&h, "c1", four_messages());

        let removed = block_on(h.session.delete("m2")).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(h.ids(), vec!["m0", "m1"]);
        assert_eq!(*h.history.deleted.borrow(), vec![("c1".to_string(), "m2".to_string())]);
        assert_eq!(h.events.drain(), vec![SessionEvent::Truncated { message_id: "m2".to_string(), removed: 2 }]);
    }

    #[test]
    fn test_delete_first_message_empties_timeline() {
        let h = harness();
        connected_with(&h, "c1", vec![
            record("a", MessageKind::User, "hello"),
            record("b", MessageKind::Assistant, "hi there"),
        ]);

        block_on(h.session.delete("a")).unwrap();

        assert!(h.session.snapshot().is_empty());
    }

    #[test]
    fn test_delete_failure_leaves_timeline() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.history.fail_delete.set(true);

        let err = block_on(h.session.delete("m2")).unwrap_err();

        assert!(matches!(err, ChatError::DeleteRejected { ref message_id, .. } if message_id == "m2"));
        assert_eq!(h.ids(), vec!["m0", "m1", "m2", "m3"]);
        assert!(h.events.drain().iter().any(|e| matches!(e, SessionEvent::DeleteFailed { .. })));
    }

    #[test]
    fn test_delete_unknown_message() {
        let h = harness();
        connected_with(&h, "c1", four_messages());

        let err = block_on(h.session.delete("nope")).unwrap_err();

        assert_eq!(err, ChatError::MessageNotFound("nope".to_string()));
        assert!(h.history.deleted.borrow().is_empty());
    }

    #[test]
    fn test_delete_allowed_after_drop() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.transport.deliver(ChannelEvent::Closed { reason: "gone".to_string() });
        h.session.pump();

        assert_eq!(block_on(h.session.delete("m3")).unwrap(), 1);
    }

    // ─── Edit Tests ──────────────────────────────────────────

    #[test]
    fn test_begin_edit_holds_current_body() {
        let h = harness();
        connected_with(&h, "c1", four_messages());

        assert_eq!(h.session.begin_edit("m2").unwrap(), "q2");
        let draft = h.session.editing().unwrap();
        assert_eq!(draft.message_id, "m2");
        assert_eq!(draft.draft, "q2");
    }

    #[test]
    fn test_begin_edit_assistant_not_editable() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        assert_eq!(h.session.begin_edit("m1"), Err(ChatError::NotEditable("m1".to_string())));
        assert!(h.session.editing().is_none());
    }

    #[test]
    fn test_only_one_edit_at_a_time() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m0").unwrap();
        h.session.update_draft("changed").unwrap();

        assert_eq!(h.session.begin_edit("m2"), Err(ChatError::EditInProgress("m0".to_string())));
        // re-entering the same edit keeps the draft
        assert_eq!(h.session.begin_edit("m0").unwrap(), "changed");
    }

    #[test]
    fn test_update_draft_without_edit() {
        let h = harness();
        assert_eq!(h.session.update_draft("x"), Err(ChatError::NoActiveEdit));
        assert!(matches!(block_on(h.session.save_edit()), Err(ChatError::NoActiveEdit)));
    }

    #[test]
    fn test_cancel_edit() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m0").unwrap();
        let draft = h.session.cancel_edit().unwrap();
        assert_eq!(draft.message_id, "m0");
        assert!(h.session.editing().is_none());
        assert_eq!(h.session.message_count(), 4);
    }

    #[test]
    fn test_save_edit_equals_delete_then_send() {
        let edited = harness();
        connected_with(&edited, "c1", four_messages());
        edited.session.begin_edit("m2").unwrap();
        edited.session.update_draft("new text").unwrap();
        block_on(edited.session.save_edit()).unwrap();

        let manual = harness();
        connected_with(&manual, "c1", four_messages());
        block_on(manual.session.delete("m2")).unwrap();
        manual.session.send("new text").unwrap();

        let view = |h: &Harness| -> Vec<(Author, String)> {
            h.session.snapshot().into_iter().map(|m| (m.author, m.body)).collect()
        };
        assert_eq!(view(&edited), view(&manual));
        assert_eq!(edited.bodies(), vec!["q1", "a1", "new text"]);
        assert!(edited.session.editing().is_none());
        assert_eq!(edited.transport.sent.borrow().len(), 1);
    }

    #[test]
    fn test_save_edit_delete_failure_keeps_draft() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m2").unwrap();
        h.session.update_draft("new text").unwrap();
        h.history.fail_delete.set(true);

        assert!(block_on(h.session.save_edit()).is_err());

        assert_eq!(h.session.editing().unwrap().draft, "new text");
        assert_eq!(h.session.message_count(), 4);
        assert!(h.transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_save_edit_twice_sends_once() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m2").unwrap();
        h.session.update_draft("new").unwrap();
        let (release, gate) = oneshot::channel();
        h.history.delete_gates.borrow_mut().insert("m2".to_string(), gate);

        let first = Rc::new(RefCell::new(None));
        let mut pool = LocalPool::new();
        let session = h.session.clone();
        let slot = first.clone();
        pool.spawner()
            .spawn_local(async move {
                *slot.borrow_mut() = Some(session.save_edit().await);
            })
            .unwrap();
        pool.run_until_stalled();

        assert!(h.session.editing().is_none());
        assert!(matches!(
            block_on(h.session.save_edit()),
            Err(ChatError::NoActiveEdit)
        ));

        release.send(()).unwrap();
        pool.run_until_stalled();

        assert!(matches!(first.borrow().as_ref(), Some(Ok(Some(_)))));
        assert_eq!(h.transport.sent.borrow().len(), 1);
        assert_eq!(h.bodies(), vec!["q1", "a1", "new"]);
        assert_eq!(h.history.deleted.borrow().len(), 1);
    }

    #[test]
    fn test_delete_of_message_removed_meanwhile_is_not_found() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        let (release, gate) = oneshot::channel();
        h.history.delete_gates.borrow_mut().insert("m2".to_string(), gate);

        let outcome = Rc::new(RefCell::new(None));
        let mut pool = LocalPool::new();
        let session = h.session.clone();
        let slot = outcome.clone();
        pool.spawner()
            .spawn_local(async move {
                *slot.borrow_mut() = Some(session.delete("m2").await);
            })
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(block_on(h.session.delete("m1")).unwrap(), 3);
        h.events.drain();

        release.send(()).unwrap();
        pool.run_until_stalled();

        assert!(matches!(
            outcome.borrow().as_ref(),
            Some(Err(ChatError::MessageNotFound(id))) if id == "m2"
        ));
        assert_eq!(h.bodies(), vec!["q1"]);
        assert!(!h.events.drain().iter().any(|e| matches!(e, SessionEvent::Truncated { .. })));
    }

    #[test]
    fn test_save_edit_failure_after_message_vanished_drops_draft() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m2").unwrap();
        let (release, gate) = oneshot::channel();
        h.history.delete_gates.borrow_mut().insert("m2".to_string(), gate);

        let outcome = Rc::new(RefCell::new(None));
        let mut pool = LocalPool::new();
        let session = h.session.clone();
        let slot = outcome.clone();
        pool.spawner()
            .spawn_local(async move {
                *slot.borrow_mut() = Some(session.save_edit().await);
            })
            .unwrap();
        pool.run_until_stalled();

        block_on(h.session.delete("m0")).unwrap();
        release.send(()).unwrap();
        pool.run_until_stalled();

        assert!(matches!(outcome.borrow().as_ref(), Some(Err(ChatError::MessageNotFound(_)))));
        assert!(h.session.editing().is_none());
        assert!(h.transport.sent.borrow().is_empty());
        assert!(h.session.snapshot().is_empty());
    }

    #[test]
    fn test_delete_clears_edit_of_removed_message() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.session.begin_edit("m2").unwrap();
        block_on(h.session.delete("m0")).unwrap();
        assert!(h.session.editing().is_none());
    }

    // ─── Staleness Tests ─────────────────────────────────────

    #[test]
    fn test_late_history_of_previous_chat_is_discarded() {
        let h = harness();
        h.history.set_page("c1", vec![record("x1", MessageKind::User, "from c1")]);
        h.history.set_page("c2", vec![
            record("y1", MessageKind::User, "from c2"),
            record("y2", MessageKind::Assistant, "reply c2"),
        ]);
        let release_c1 = h.history.gate("c1");

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c1").await;
            })
            .unwrap();
        pool.run_until_stalled();

        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c2").await;
            })
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(h.bodies(), vec!["from c2", "reply c2"]);

        release_c1.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(h.bodies(), vec!["from c2", "reply c2"]);
        assert_eq!(h.session.active_chat_id().as_deref(), Some("c2"));
        assert_eq!(h.session.state(), ConnectionState::Connected { chat_id: "c2".to_string() });
    }

    #[test]
    fn test_stale_credential_does_not_connect() {
        let h = harness();
        let (release_first, gate) = oneshot::channel();
        h.credentials.gates.borrow_mut().push_back(Some(gate));

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c1").await;
            })
            .unwrap();
        pool.run_until_stalled();

        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c2").await;
            })
            .unwrap();
        pool.run_until_stalled();

        release_first.send(()).unwrap();
        pool.run_until_stalled();

        let connects = h.transport.connects.borrow();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].1, "c2");
        assert_eq!(h.session.state(), ConnectionState::Connected { chat_id: "c2".to_string() });
    }

    #[test]
    fn test_delete_confirmed_after_switch_is_ignored() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.history.set_page("c2", vec![record("z1", MessageKind::User, "other")]);
        let (release, gate) = oneshot::channel();
        h.history.delete_gates.borrow_mut().insert("m2".to_string(), gate);

        let removed = Rc::new(Cell::new(None));
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let session = h.session.clone();
        let slot = removed.clone();
        spawner
            .spawn_local(async move {
                slot.set(Some(session.delete("m2").await));
            })
            .unwrap();
        pool.run_until_stalled();

        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c2").await;
            })
            .unwrap();
        pool.run_until_stalled();

        release.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(removed.take(), Some(Ok(0)));
        assert_eq!(h.bodies(), vec!["other"]);
        assert!(!h.events.drain().iter().any(|e| matches!(e, SessionEvent::Truncated { .. })));
    }

    #[test]
    fn test_edit_saved_across_switch_is_not_sent() {
        let h = harness();
        connected_with(&h, "c1", four_messages());
        h.history.set_page("c2", vec![record("z1", MessageKind::User, "other")]);
        h.session.begin_edit("m2").unwrap();
        h.session.update_draft("edited for c1").unwrap();
        let (release, gate) = oneshot::channel();
        h.history.delete_gates.borrow_mut().insert("m2".to_string(), gate);

        let outcome = Rc::new(RefCell::new(None));
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let session = h.session.clone();
        let slot = outcome.clone();
        spawner
            .spawn_local(async move {
                *slot.borrow_mut() = Some(session.save_edit().await);
            })
            .unwrap();
        pool.run_until_stalled();

        let session = h.session.clone();
        spawner
            .spawn_local(async move {
                let _ = session.switch_conversation("c2").await;
            })
            .unwrap();
        pool.run_until_stalled();

        release.send(()).unwrap();
        pool.run_until_stalled();

        assert!(matches!(outcome.borrow().as_ref(), Some(Ok(None))));
        assert!(h.transport.sent.borrow().is_empty());
        assert_eq!(h.bodies(), vec!["other"]);
        assert!(h.session.editing().is_none());
        assert_eq!(h.session.active_chat_id().as_deref(), Some("c2"));
    }

    // ─── Account Tests ───────────────────────────────────────

    #[test]
    fn test_logout_discards_session_keeps_chat_id() {
        let h = harness();
        block_on(SessionStore::new(h.storage.clone()).save_account("jwt", &ada())).unwrap();
        connected_with(&h, "c1", four_messages());

        block_on(h.session.logout());

        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(h.session.snapshot().is_empty());
        assert!(!h.session.has_credential());
        assert!(h.session.account().is_empty());
        assert!(!h.transport.is_connected());
        assert!(h.stored(TOKEN_KEY).is_none());
        assert!(h.stored(USER_KEY).is_none());
        assert_eq!(h.stored(CHAT_ID_KEY).as_deref(), Some("c1"));
        assert_eq!(h.events.drain(), vec![SessionEvent::LoggedOut]);
    }

    #[test]
    fn test_list_conversations_uses_account() {
        let h = harness();
        h.history.conversations.borrow_mut().push(ConversationSummary {
            chat_id: "c1".to_string(),
            title: "hello".to_string(),
            created_at: None,
        });

        let list = block_on(h.session.list_conversations()).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(*h.history.listed_for.borrow(), vec!["ada@example.com".to_string()]);
    }

    #[test]
    fn test_list_conversations_requires_account() {
        let h = harness();
        block_on(h.session.logout());
        assert!(matches!(block_on(h.session.list_conversations()), Err(ChatError::Auth(_))));
    }
}
