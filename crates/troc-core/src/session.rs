use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::classifier::classify;
use crate::constants::{
    is_preset_question, RESUBSCRIBE_BACKOFF_BASE_MS, RESUBSCRIBE_BACKOFF_MAX_MS,
};
use crate::delivery::{ConversationView, DeliveryEngine, ViewMessage};
use crate::errors::ChatError;
use crate::events::CoreEvent;
use crate::feed::{ChangeFeed, FeedSubscription};
use crate::gate::{AccessGate, GateMode};
use crate::models::Message;
use crate::store::ThreadStore;

/// Result of a successful send: the canonical message plus an advisory when
/// the classifier flagged the content. The content is persisted unchanged
/// either way.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message: Message,
    pub advisory: Option<String>,
}

/// Per-open-thread controller composing the access gate, delivery engine
/// and content classifier. Holds the thread's live feed subscription; the
/// in-memory view is a read-through cache, never authoritative.
pub struct ConversationSession {
    thread_id: String,
    viewer_id: String,
    gate: Arc<AccessGate>,
    engine: DeliveryEngine,
    view: Arc<Mutex<ConversationView>>,
    /// Original text of the last failed send, for the compose buffer.
    restored_input: Mutex<Option<String>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("thread_id", &self.thread_id)
            .field("viewer_id", &self.viewer_id)
            .finish_non_exhaustive()
    }
}

impl ConversationSession {
    /// Subscribe to the thread's change feed, load history, start the pump
    /// task that folds inbound events into the view.
    pub(crate) async fn open(
        store: Arc<ThreadStore>,
        feed: Arc<ChangeFeed>,
        gate: Arc<AccessGate>,
        thread_id: &str,
        viewer_id: &str,
    ) -> Result<Self, ChatError> {
        // Subscribe before the history load so nothing published in between
        // is missed; the view dedups any overlap.
        let subscription = feed.subscribe(thread_id);

        let (load_store, tid, vid) = (
            store.clone(),
            thread_id.to_string(),
            viewer_id.to_string(),
        );
        let (is_member, messages) = tokio::task::spawn_blocking(move || {
            let is_member = load_store.is_participant(&tid, &vid)?;
            let messages = load_store.history(&tid)?;
            Ok::<_, ChatError>((is_member, messages))
        })
        .await
        .unwrap_or_else(|join_err| {
            Err(ChatError::TransientWrite {
                message: format!("history load failed: {join_err}"),
            })
        })?;
        if !is_member {
            return Err(ChatError::NotFound {
                what: format!("participant {viewer_id} in thread {thread_id}"),
            });
        }

        let mut view = ConversationView::new();
        for message in messages {
            view.apply_inbound(message);
        }
        let view = Arc::new(Mutex::new(view));

        let pump = tokio::spawn(run_pump(
            subscription,
            feed.clone(),
            store.clone(),
            thread_id.to_string(),
            Arc::downgrade(&view),
        ));

        Ok(Self {
            thread_id: thread_id.to_string(),
            viewer_id: viewer_id.to_string(),
            gate,
            engine: DeliveryEngine::new(store, feed),
            view,
            restored_input: Mutex::new(None),
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Current gate mode, re-evaluated against the oracle (sticky unlock).
    pub fn mode(&self) -> Result<GateMode, ChatError> {
        self.gate.mode(&self.thread_id)
    }

    /// Send `text` under the current gate mode.
    ///
    /// Restricted: only a preset question this viewer has not yet sent in
    /// this thread is accepted; anything else is rejected locally without a
    /// store call. Presets are known-safe and skip the classifier.
    ///
    /// Unlocked: free text, classified for contact sharing (advisory only),
    /// then delivered optimistically per the send protocol.
    pub async fn send(&self, text: &str) -> Result<SendReceipt, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation {
                message: "message content is empty".to_string(),
            });
        }

        let advisory = match self.gate.mode(&self.thread_id)? {
            GateMode::Restricted => {
                if !is_preset_question(trimmed) {
                    return Err(ChatError::Gate {
                        message: "only preset questions are allowed before a confirmed booking"
                            .to_string(),
                    });
                }
                if self.view.lock().sender_sent(&self.viewer_id, trimmed) {
                    return Err(ChatError::Gate {
                        message: "this question was already asked".to_string(),
                    });
                }
                None
            }
            GateMode::Unlocked => classify(trimmed).advisory,
        };

        match self
            .engine
            .send(self.view.clone(), &self.thread_id, &self.viewer_id, trimmed)
            .await
        {
            Ok(message) => Ok(SendReceipt { message, advisory }),
            Err(failure) => {
                *self.restored_input.lock() = failure.restored_input;
                Err(failure.error)
            }
        }
    }

    /// Ordered plain-data snapshot of the conversation for the UI layer.
    pub fn messages(&self) -> Vec<ViewMessage> {
        self.view.lock().snapshot()
    }

    /// Takes the original text of the last failed send, if any, so the
    /// caller can restore the compose buffer and retry.
    pub fn take_restored_input(&self) -> Option<String> {
        self.restored_input.lock().take()
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Stop the pump and drop the feed subscription. An in-flight send
    /// still completes server-side; the pump's weak view reference keeps it
    /// from touching a torn-down view.
    pub fn close(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_pump(
    mut subscription: FeedSubscription,
    feed: Arc<ChangeFeed>,
    store: Arc<ThreadStore>,
    thread_id: String,
    view: Weak<Mutex<ConversationView>>,
) {
    let mut backoff_ms = RESUBSCRIBE_BACKOFF_BASE_MS;
    loop {
        match subscription.next_event().await {
            Ok(CoreEvent::MessageInserted(message)) => {
                backoff_ms = RESUBSCRIBE_BACKOFF_BASE_MS;
                let Some(view) = view.upgrade() else { break };
                view.lock().apply_inbound(message);
            }
            Err(_) => {
                // Lagged or closed: resubscribe with backoff, then re-fetch
                // history to repair missed events. Dedup makes the merge safe.
                tracing::warn!(thread_id = %thread_id, "change feed disconnected, resubscribing");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(RESUBSCRIBE_BACKOFF_MAX_MS);

                subscription = feed.subscribe(&thread_id);
                let (refetch_store, tid) = (store.clone(), thread_id.clone());
                let history =
                    tokio::task::spawn_blocking(move || refetch_store.history(&tid)).await;
                let Some(view) = view.upgrade() else { break };
                if let Ok(Ok(messages)) = history {
                    let mut view = view.lock();
                    for message in messages {
                        view.apply_inbound(message);
                    }
                }
            }
        }
    }
}
