use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::constants::FEED_CHANNEL_CAPACITY;
use crate::errors::ChatError;
use crate::events::CoreEvent;

/// Publish/subscribe channel keyed by thread id, delivering "message
/// inserted" events to every open session on that thread. Channels are
/// created on first subscribe and garbage-collected once their last
/// receiver is gone.
pub struct ChangeFeed {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<CoreEvent>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, thread_id: &str) -> FeedSubscription {
        let mut channels = self.channels.write();
        let tx = channels
            .entry(thread_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        FeedSubscription { rx: tx.subscribe() }
    }

    pub fn publish(&self, thread_id: &str, event: CoreEvent) {
        let no_receivers = {
            let channels = self.channels.read();
            match channels.get(thread_id) {
                Some(tx) => tx.send(event).is_err(),
                // Nobody ever subscribed to this thread; nothing to do.
                None => false,
            }
        };
        if no_receivers {
            let mut channels = self.channels.write();
            // Re-check under the write lock: a session may have subscribed
            // between the send and now.
            if let Some(tx) = channels.get(thread_id) {
                if tx.receiver_count() == 0 {
                    channels.remove(thread_id);
                }
            }
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one thread's change feed. Dropping it
/// unsubscribes; a receiver that lags past the channel capacity is
/// disconnected and must re-fetch history.
pub struct FeedSubscription {
    rx: broadcast::Receiver<CoreEvent>,
}

impl FeedSubscription {
    pub async fn next_event(&mut self) -> Result<CoreEvent, ChatError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change feed receiver lagged");
                Err(ChatError::ChannelDisconnected)
            }
            Err(broadcast::error::RecvError::Closed) => Err(ChatError::ChannelDisconnected),
        }
    }
}
