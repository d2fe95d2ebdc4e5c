use serde::{Deserialize, Serialize};

use super::identity::Identity;

/// A two-party conversation container. Threads are created when the first
/// message-worthy interaction begins and are never deleted by normal flow;
/// they are owned jointly by their two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    /// Reference to the offering being discussed, if any.
    pub subject_ref: Option<String>,
    /// Unix milliseconds
    pub created_at: u64,
}

/// A `(thread_id, user_id)` membership row. A given user appears at most
/// once per thread; the "other party" for a viewer is the row with a
/// different `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub thread_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub content: String,
    pub sent_at: u64,
}

/// One inbox row: the thread plus everything the list view needs, resolved
/// in bulk by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub other_party: Identity,
    pub subject_label: Option<String>,
    pub last_message: Option<MessagePreview>,
    /// Last message time, falling back to thread creation when no messages
    /// exist yet. Inbox sort key, descending.
    pub last_activity: u64,
}
