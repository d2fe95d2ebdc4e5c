use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::is_preset_question;
use crate::errors::ChatError;
use crate::gate::{AccessGate, GateMode};
use crate::models::{Message, MessagePreview, Participant, Thread};
use crate::store::Database;

/// The authoritative message store. Wraps [`Database`] and mirrors the
/// restricted-mode whitelist server-side: the session's guard is only a
/// no-network fast path, so a modified client must still be rejected here.
pub struct ThreadStore {
    db: Database,
    gate: Arc<AccessGate>,
}

impl ThreadStore {
    pub fn new(db: Database, gate: Arc<AccessGate>) -> Self {
        Self { db, gate }
    }

    pub fn gate(&self) -> Arc<AccessGate> {
        self.gate.clone()
    }

    pub fn create_thread(
        &self,
        user_a: &str,
        user_b: &str,
        subject_ref: Option<&str>,
    ) -> Result<Thread, ChatError> {
        self.db.create_thread(user_a, user_b, subject_ref)
    }

    /// Append with the gate mirror applied: while the pair has no confirmed
    /// transaction, only a preset question this sender has not sent before
    /// is accepted. `sent_at` is assigned inside, never trusted from the
    /// client.
    pub fn append(
        &self,
        thread_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation {
                message: "message content is empty".to_string(),
            });
        }

        if self.gate.mode(thread_id)? == GateMode::Restricted {
            if !is_preset_question(content) {
                tracing::warn!(thread_id, sender_id, "free text rejected while restricted");
                return Err(ChatError::Gate {
                    message: "only preset questions are allowed before a confirmed booking"
                        .to_string(),
                });
            }
            if self.db.sender_sent_content(thread_id, sender_id, content)? {
                return Err(ChatError::Gate {
                    message: "this question was already asked".to_string(),
                });
            }
        }

        self.db.append_message(thread_id, sender_id, content)
    }

    pub fn history(&self, thread_id: &str) -> Result<Vec<Message>, ChatError> {
        self.db.history(thread_id)
    }

    pub fn threads_for(&self, user_id: &str) -> Result<Vec<Thread>, ChatError> {
        self.db.threads_for(user_id)
    }

    pub fn is_participant(&self, thread_id: &str, user_id: &str) -> Result<bool, ChatError> {
        self.db.is_participant(thread_id, user_id)
    }

    pub fn participants_for_threads(
        &self,
        thread_ids: &[String],
    ) -> Result<Vec<Participant>, ChatError> {
        self.db.participants_for_threads(thread_ids)
    }

    pub fn last_messages(
        &self,
        thread_ids: &[String],
    ) -> Result<HashMap<String, MessagePreview>, ChatError> {
        self.db.last_messages(thread_ids)
    }
}
