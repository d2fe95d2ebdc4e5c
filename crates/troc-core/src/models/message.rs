use serde::{Deserialize, Serialize};

/// A persisted message. `sent_at` is assigned by the store clock at append
/// time and never trusted from the client; `seq` is the store's insertion
/// sequence and breaks ties between same-millisecond appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub content: String,
    /// Unix milliseconds, store clock
    pub sent_at: u64,
    pub seq: i64,
}

/// A client-local message shown to the sender between submission and
/// reconciliation. Never persisted: it is either replaced by the canonical
/// [`Message`] returned by the store or discarded on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticMessage {
    /// Client-generated id, prefixed so it cannot collide with the
    /// store-assigned id space.
    pub temp_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub content: String,
    /// Local wall-clock stamp, only used to position the entry in the view
    /// until the authoritative `sent_at` arrives.
    pub local_ts: u64,
}

/// Current Unix timestamp in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
