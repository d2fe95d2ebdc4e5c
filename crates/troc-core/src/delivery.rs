use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::OPTIMISTIC_ID_PREFIX;
use crate::errors::ChatError;
use crate::events::CoreEvent;
use crate::feed::ChangeFeed;
use crate::models::message::now_millis;
use crate::models::{Message, OptimisticMessage};
use crate::store::ThreadStore;

/// One entry of a session's in-memory ordered view.
#[derive(Debug, Clone)]
pub enum ViewEntry {
    Canonical(Message),
    Optimistic(OptimisticMessage),
}

impl ViewEntry {
    pub fn id(&self) -> &str {
        match self {
            ViewEntry::Canonical(m) => &m.id,
            ViewEntry::Optimistic(m) => &m.temp_id,
        }
    }
}

/// Plain-data row handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: u64,
    /// True while the entry is optimistic (not yet confirmed by the store).
    pub pending: bool,
}

/// The reconciliation queue behind a session's message list. Pure and
/// IO-free so the dedup logic is unit-testable away from the engine.
///
/// Invariants:
/// - at most one entry per canonical message id, ever;
/// - entries are kept sorted ascending by `(sent_at, seq)`, optimistic
///   entries sorting by their local timestamp after canonical ties;
/// - the view is a read-through cache, never authoritative: a conflict with
///   an inbound canonical event resolves in favor of the canonical event.
#[derive(Default)]
pub struct ConversationView {
    entries: Vec<ViewEntry>,
    /// Canonical ids present in `entries`.
    known_ids: HashSet<String>,
    /// temp id -> canonical id, filled at reconciliation.
    reconciled: HashMap<String, String>,
    local_seq: u64,
    local_order: HashMap<String, u64>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 2 of the send protocol: materialize the message locally with
    /// zero latency. Returns nothing; the entry is matched later by temp id.
    pub fn insert_optimistic(&mut self, optimistic: OptimisticMessage) {
        self.local_seq += 1;
        self.local_order
            .insert(optimistic.temp_id.clone(), self.local_seq);
        self.entries.push(ViewEntry::Optimistic(optimistic));
        self.resort();
    }

    /// Step 4: replace the optimistic entry with the canonical message. If
    /// the canonical copy already arrived over the feed (the fan-out race),
    /// the optimistic entry is simply dropped.
    pub fn confirm(&mut self, temp_id: &str, canonical: Message) {
        self.reconciled
            .insert(temp_id.to_string(), canonical.id.clone());

        if self.known_ids.contains(&canonical.id) {
            self.remove(temp_id);
            return;
        }

        self.local_order.remove(temp_id);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id() == temp_id) {
            self.known_ids.insert(canonical.id.clone());
            *entry = ViewEntry::Canonical(canonical);
            self.resort();
        } else {
            // Optimistic entry already gone (e.g. view rebuilt after a feed
            // disconnect); treat the canonical copy as inbound.
            self.apply_inbound(canonical);
        }
    }

    /// Step 5: roll back a failed optimistic entry, handing the original
    /// text back for the compose buffer.
    pub fn fail(&mut self, temp_id: &str) -> Option<String> {
        self.local_order.remove(temp_id);
        self.remove(temp_id)
    }

    /// Step 6: apply a canonical message from the change feed. Idempotent by
    /// canonical id, so the sender's own fan-out copy and history re-fetch
    /// merges never produce duplicates.
    pub fn apply_inbound(&mut self, canonical: Message) {
        if self.known_ids.contains(&canonical.id) {
            return;
        }
        self.known_ids.insert(canonical.id.clone());
        self.entries.push(ViewEntry::Canonical(canonical));
        self.resort();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id) || self.entries.iter().any(|e| e.id() == id)
    }

    /// Canonical id a temporary id reconciled to, if known.
    pub fn canonical_id_for(&self, temp_id: &str) -> Option<&str> {
        self.reconciled.get(temp_id).map(String::as_str)
    }

    pub fn sender_sent(&self, sender_id: &str, content: &str) -> bool {
        self.entries.iter().any(|e| match e {
            ViewEntry::Canonical(m) => m.sender_id == sender_id && m.content == content,
            ViewEntry::Optimistic(m) => m.sender_id == sender_id && m.content == content,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered plain-data snapshot for the UI layer.
    pub fn snapshot(&self) -> Vec<ViewMessage> {
        self.entries
            .iter()
            .map(|e| match e {
                ViewEntry::Canonical(m) => ViewMessage {
                    id: m.id.clone(),
                    sender_id: m.sender_id.clone(),
                    content: m.content.clone(),
                    sent_at: m.sent_at,
                    pending: false,
                },
                ViewEntry::Optimistic(m) => ViewMessage {
                    id: m.temp_id.clone(),
                    sender_id: m.sender_id.clone(),
                    content: m.content.clone(),
                    sent_at: m.local_ts,
                    pending: true,
                },
            })
            .collect()
    }

    fn remove(&mut self, id: &str) -> Option<String> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        match self.entries.remove(idx) {
            ViewEntry::Optimistic(m) => Some(m.content),
            ViewEntry::Canonical(m) => Some(m.content),
        }
    }

    /// Resort after every mutation rather than assuming append-only display
    /// order: a reconciled message may carry an earlier authoritative
    /// `sent_at` than a message that was already in the view.
    fn resort(&mut self) {
        self.entries.sort_by_key(|e| match e {
            ViewEntry::Canonical(m) => (m.sent_at, 0u8, m.seq as u64),
            ViewEntry::Optimistic(m) => (
                m.local_ts,
                1u8,
                *self.local_order.get(&m.temp_id).unwrap_or(&u64::MAX),
            ),
        });
    }
}

/// Rollback result of a failed send: the error plus the original input so
/// the caller can restore the compose buffer and retry.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub error: ChatError,
    pub restored_input: Option<String>,
}

/// Orchestrates the optimistic-then-authoritative send protocol and the
/// change-feed fan-out.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<ThreadStore>,
    feed: Arc<ChangeFeed>,
}

impl DeliveryEngine {
    pub fn new(store: Arc<ThreadStore>, feed: Arc<ChangeFeed>) -> Self {
        Self { store, feed }
    }

    /// Optimistic insert, authoritative append, reconcile, fan out. On store
    /// failure the optimistic entry is rolled back and the original text is
    /// returned for resubmission; the error is recoverable, never fatal to
    /// the session.
    pub async fn send(
        &self,
        view: Arc<Mutex<ConversationView>>,
        thread_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, DeliveryFailure> {
        let temp_id = format!("{}{}", OPTIMISTIC_ID_PREFIX, Uuid::new_v4());
        view.lock().insert_optimistic(OptimisticMessage {
            temp_id: temp_id.clone(),
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            local_ts: now_millis(),
        });

        let store = self.store.clone();
        let (tid, sid, body) = (
            thread_id.to_string(),
            sender_id.to_string(),
            content.to_string(),
        );
        let result = tokio::task::spawn_blocking(move || store.append(&tid, &sid, &body))
            .await
            .unwrap_or_else(|join_err| {
                Err(ChatError::TransientWrite {
                    message: format!("append task failed: {join_err}"),
                })
            });

        match result {
            Ok(message) => {
                view.lock().confirm(&temp_id, message.clone());
                self.feed
                    .publish(thread_id, CoreEvent::MessageInserted(message.clone()));
                tracing::debug!(thread_id, message_id = %message.id, "message delivered");
                Ok(message)
            }
            Err(error) => {
                let restored_input = view.lock().fail(&temp_id);
                tracing::warn!(thread_id, %error, "send rolled back");
                Err(DeliveryFailure {
                    error,
                    restored_input,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{AccessGate, TransactionOracle};
    use crate::store::Database;
    use tempfile::tempdir;

    fn canonical(id: &str, sender: &str, content: &str, sent_at: u64, seq: i64) -> Message {
        Message {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            sender_id: sender.to_string(),
            content: content.to_string(),
            sent_at,
            seq,
        }
    }

    fn optimistic(temp_id: &str, sender: &str, content: &str, local_ts: u64) -> OptimisticMessage {
        OptimisticMessage {
            temp_id: temp_id.to_string(),
            thread_id: "t1".to_string(),
            sender_id: sender.to_string(),
            content: content.to_string(),
            local_ts,
        }
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let mut view = ConversationView::new();
        view.insert_optimistic(optimistic("local-1", "x", "hello", 100));

        let msg = canonical("m1", "x", "hello", 105, 1);
        view.confirm("local-1", msg.clone());
        // The sender's own fan-out copy arrives afterwards.
        view.apply_inbound(msg.clone());
        view.apply_inbound(msg);

        assert_eq!(view.len(), 1);
        assert_eq!(view.canonical_id_for("local-1"), Some("m1"));
        let snapshot = view.snapshot();
        assert_eq!(snapshot[0].id, "m1");
        assert!(!snapshot[0].pending);
    }

    #[test]
    fn inbound_before_confirm_race_produces_one_entry() {
        let mut view = ConversationView::new();
        view.insert_optimistic(optimistic("local-1", "x", "hello", 100));

        // Fan-out beats the append call's return value.
        let msg = canonical("m1", "x", "hello", 105, 1);
        view.apply_inbound(msg.clone());
        assert_eq!(view.len(), 2);

        view.confirm("local-1", msg);
        assert_eq!(view.len(), 1);
        assert_eq!(view.snapshot()[0].id, "m1");
    }

    #[test]
    fn fail_rolls_back_and_returns_original_text() {
        let mut view = ConversationView::new();
        view.insert_optimistic(optimistic("local-1", "x", "draft text", 100));

        let restored = view.fail("local-1");
        assert_eq!(restored.as_deref(), Some("draft text"));
        assert!(view.is_empty());
        assert!(view.fail("local-1").is_none());
    }

    #[test]
    fn view_is_resorted_on_inbound_with_earlier_sent_at() {
        // A (10:00:01) from X was the only optimistic entry; B (10:00:00)
        // from Y arrives afterwards. Final order must be [B, A].
        let mut view = ConversationView::new();
        view.insert_optimistic(optimistic("local-a", "x", "A", 1_000));
        view.confirm("local-a", canonical("a", "x", "A", 1_000, 2));

        view.apply_inbound(canonical("b", "y", "B", 999, 1));

        let order: Vec<String> = view.snapshot().into_iter().map(|m| m.content).collect();
        assert_eq!(order, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn optimistic_entries_sort_after_canonical_ties() {
        let mut view = ConversationView::new();
        view.apply_inbound(canonical("m1", "y", "first", 1_000, 1));
        view.insert_optimistic(optimistic("local-1", "x", "second", 1_000));

        let snapshot = view.snapshot();
        assert_eq!(snapshot[0].id, "m1");
        assert!(snapshot[1].pending);
    }

    struct AlwaysConfirmed;
    impl TransactionOracle for AlwaysConfirmed {
        fn is_confirmed(&self, _thread_id: &str) -> Result<bool, ChatError> {
            Ok(true)
        }
    }

    fn engine(dir: &std::path::Path) -> (DeliveryEngine, Arc<ThreadStore>) {
        let gate = Arc::new(AccessGate::new(Arc::new(AlwaysConfirmed)));
        let store = Arc::new(ThreadStore::new(Database::open(dir).unwrap(), gate));
        (
            DeliveryEngine::new(store.clone(), Arc::new(ChangeFeed::new())),
            store,
        )
    }

    #[tokio::test]
    async fn send_reconciles_against_the_store() {
        let dir = tempdir().unwrap();
        let (engine, store) = engine(dir.path());
        let thread = store.create_thread("alice", "bob", None).unwrap();
        let view = Arc::new(Mutex::new(ConversationView::new()));

        let msg = engine
            .send(view.clone(), &thread.id, "alice", "hello bob")
            .await
            .unwrap();

        let snapshot = view.lock().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, msg.id);
        assert!(!snapshot[0].pending);
        assert_eq!(store.history(&thread.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_rolls_back_the_view() {
        let dir = tempdir().unwrap();
        let (engine, _store) = engine(dir.path());
        let view = Arc::new(Mutex::new(ConversationView::new()));

        let failure = engine
            .send(view.clone(), "no-such-thread", "alice", "hello?")
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ChatError::NotFound { .. }));
        assert_eq!(failure.restored_input.as_deref(), Some("hello?"));
        assert!(view.lock().is_empty());
    }
}
