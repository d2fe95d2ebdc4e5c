use std::sync::Arc;

use crate::aggregator::{CatalogResolver, IdentityDirectory, ThreadAggregator};
use crate::config::CoreConfig;
use crate::errors::ChatError;
use crate::feed::ChangeFeed;
use crate::gate::{AccessGate, TransactionOracle};
use crate::session::ConversationSession;
use crate::store::{Database, ThreadStore};

/// Composition root: opens the database, builds the shared change feed and
/// access gate, and hands out the store, the inbox aggregator, and
/// per-thread conversation sessions. The transaction, identity, and catalog
/// subsystems are external collaborators injected here.
pub struct CoreRuntime {
    store: Arc<ThreadStore>,
    feed: Arc<ChangeFeed>,
    gate: Arc<AccessGate>,
    aggregator: ThreadAggregator,
}

impl CoreRuntime {
    pub fn new(
        config: CoreConfig,
        oracle: Arc<dyn TransactionOracle>,
        directory: Arc<dyn IdentityDirectory>,
        catalog: Arc<dyn CatalogResolver>,
    ) -> Result<Self, ChatError> {
        let db = Database::open(&config.data_dir)?;
        let gate = Arc::new(AccessGate::new(oracle));
        let store = Arc::new(ThreadStore::new(db, gate.clone()));
        let feed = Arc::new(ChangeFeed::new());
        let aggregator = ThreadAggregator::new(store.clone(), directory, catalog);

        tracing::info!(data_dir = %config.data_dir.display(), "core runtime ready");
        Ok(Self {
            store,
            feed,
            gate,
            aggregator,
        })
    }

    pub fn store(&self) -> Arc<ThreadStore> {
        self.store.clone()
    }

    pub fn aggregator(&self) -> &ThreadAggregator {
        &self.aggregator
    }

    /// Open a live session on a thread. Fails with `NotFound` when the
    /// viewer is not one of the thread's two participants.
    pub async fn open_session(
        &self,
        thread_id: &str,
        viewer_id: &str,
    ) -> Result<ConversationSession, ChatError> {
        ConversationSession::open(
            self.store.clone(),
            self.feed.clone(),
            self.gate.clone(),
            thread_id,
            viewer_id,
        )
        .await
    }
}
