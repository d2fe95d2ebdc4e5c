/// Error taxonomy for the conversation core. Every variant is scoped to a
/// single send attempt or session; none is fatal to the hosting process.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Empty/whitespace content, malformed input. Recovered locally; the
    /// message never leaves the client.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Content not allowed in the conversation's current gate mode.
    /// Recovered locally, surfaced as a UI hint.
    #[error("gate rejected message: {message}")]
    Gate { message: String },

    /// Thread or sender-participant pairing missing. Fatal to the send
    /// attempt; any optimistic entry is rolled back.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Store failure during an authoritative write. Recovered by
    /// rollback-and-retry; the caller may resubmit.
    #[error("write failed: {message}")]
    TransientWrite { message: String },

    /// The change-feed subscription dropped or lagged. Recovered by
    /// resubscribe-with-backoff plus a full history re-fetch.
    #[error("change feed disconnected")]
    ChannelDisconnected,

    #[error("failed to acquire lock on {resource}")]
    Lock { resource: String },
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => ChatError::NotFound {
                what: "row".to_string(),
            },
            other => ChatError::TransientWrite {
                message: other.to_string(),
            },
        }
    }
}
