use crate::models::Message;

/// Events pushed over the per-thread change feed. Every subscribed session
/// receives these, including the sender's own.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A canonical message was persisted by the store.
    MessageInserted(Message),
}
