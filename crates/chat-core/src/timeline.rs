//! Local timeline: the ordered messages of the active conversation.
//!
//! Inbound channel events are merged one at a time:
//! 1. Empty timeline → append.
//! 2. Same id as the last entry → replace it in place (streamed reply growing).
//! 3. Echo of something already shown → suppressed (`ContentEquality`) or
//!    reconciled in place (`CorrelationToken`).
//! 4. Anything else → append.

use chat_types::{config::DedupPolicy, message::Message};

/// What a merge did to the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    /// The last entry was replaced by a newer version of itself
    Updated { index: usize },
    /// A local entry adopted the server's copy of itself
    Reconciled { index: usize },
    /// The event duplicated an existing entry and was dropped
    Suppressed,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    policy: DedupPolicy,
}

impl Timeline {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            messages: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: DedupPolicy) {
        self.policy = policy;
    }

    /// Merge one inbound event.
    pub fn merge(&mut self, incoming: Message) -> MergeOutcome {
        if self.messages.is_empty() {
            self.messages.push(incoming);
            return MergeOutcome::Appended;
        }

        let last_index = self.messages.len() - 1;
        let last = &mut self.messages[last_index];
        if last.id == incoming.id {
            let correlation_id = incoming.correlation_id.clone().or(last.correlation_id.take());
            *last = Message { correlation_id, ..incoming };
            return MergeOutcome::Updated { index: last_index };
        }

        match self.policy {
            DedupPolicy::ContentEquality => {
                if self.messages.iter().any(|m| m.body == incoming.body) {
                    return MergeOutcome::Suppressed;
                }
            }
            DedupPolicy::CorrelationToken => {
                if let Some(index) = self.correlated_position(&incoming) {
                    self.messages[index] = incoming;
                    return MergeOutcome::Reconciled { index };
                }
            }
        }

        self.messages.push(incoming);
        MergeOutcome::Appended
    }

    fn correlated_position(&self, incoming: &Message) -> Option<usize> {
        let token = incoming.correlation_id.as_deref()?;
        self.messages
            .iter()
            .position(|m| m.correlation_id.as_deref() == Some(token))
    }

    /// Append a locally originated message without any dedup checks.
    pub fn push_local(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Put fetched history in front of whatever arrived while it was loading.
    /// Entries already present in `history` (by id) are not repeated.
    /// Returns the number of history entries placed.
    pub fn replay_history(&mut self, history: Vec<Message>) -> usize {
        let count = history.len();
        let live = std::mem::replace(&mut self.messages, history);
        for message in live {
            if !self.messages.iter().any(|m| m.id == message.id) {
                self.messages.push(message);
            }
        }
        count
    }

    /// Remove the message with `id` and everything after it.
    /// Returns how many entries were removed, or None if `id` is absent.
    pub fn truncate_from(&mut self, id: &str) -> Option<usize> {
        let index = self.position(id)?;
        let removed = self.messages.len() - index;
        self.messages.truncate(index);
        Some(removed)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
