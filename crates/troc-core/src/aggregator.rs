use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::ChatError;
use crate::models::{Identity, Profile, Thread, ThreadSummary};
use crate::store::ThreadStore;

/// Read-only, batch-capable lookup into the identity subsystem. The
/// counterpart of a thread may live in either of two namespaces.
pub trait IdentityDirectory: Send + Sync {
    fn lookup_businesses(&self, user_ids: &[String])
        -> Result<HashMap<String, Profile>, ChatError>;
    fn lookup_individuals(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, Profile>, ChatError>;
}

/// Read-only resolution of human-readable labels for `subject_ref`s.
pub trait CatalogResolver: Send + Sync {
    fn subject_labels(&self, refs: &[String]) -> Result<HashMap<String, String>, ChatError>;
}

/// Builds the inbox list. Resolving N threads issues a small constant
/// number of bulk queries: one thread list, one participants batch, one
/// last-message batch, one lookup per identity namespace, one catalog batch.
pub struct ThreadAggregator {
    store: Arc<ThreadStore>,
    directory: Arc<dyn IdentityDirectory>,
    catalog: Arc<dyn CatalogResolver>,
}

impl ThreadAggregator {
    pub fn new(
        store: Arc<ThreadStore>,
        directory: Arc<dyn IdentityDirectory>,
        catalog: Arc<dyn CatalogResolver>,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
        }
    }

    pub fn inbox(&self, user_id: &str) -> Result<Vec<ThreadSummary>, ChatError> {
        let threads = self.store.threads_for(user_id)?;
        if threads.is_empty() {
            return Ok(Vec::new());
        }
        let thread_ids: Vec<String> = threads.iter().map(|t| t.id.clone()).collect();

        // Other-party id per thread.
        let mut other_by_thread: HashMap<String, String> = HashMap::new();
        for participant in self.store.participants_for_threads(&thread_ids)? {
            if participant.user_id != user_id {
                other_by_thread.insert(participant.thread_id, participant.user_id);
            }
        }

        let last_messages = self.store.last_messages(&thread_ids)?;
        let other_party = self.resolve_identities(&other_by_thread)?;

        let subject_refs: Vec<String> = threads
            .iter()
            .filter_map(|t| t.subject_ref.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let subject_labels = if subject_refs.is_empty() {
            HashMap::new()
        } else {
            self.catalog.subject_labels(&subject_refs)?
        };

        let mut summaries: Vec<ThreadSummary> = threads
            .into_iter()
            .map(|thread| self.summarize(thread, &other_by_thread, &other_party, &last_messages, &subject_labels))
            .collect();

        // Most recently active first.
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    /// Business namespace first, then individual, then a generic
    /// placeholder — one batched call per namespace, never per thread.
    fn resolve_identities(
        &self,
        other_by_thread: &HashMap<String, String>,
    ) -> Result<HashMap<String, Identity>, ChatError> {
        let other_ids: Vec<String> = other_by_thread
            .values()
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let businesses = self.directory.lookup_businesses(&other_ids)?;
        let remaining: Vec<String> = other_ids
            .iter()
            .filter(|id| !businesses.contains_key(*id))
            .cloned()
            .collect();
        let individuals = self.directory.lookup_individuals(&remaining)?;

        let mut identities = HashMap::new();
        for id in other_ids {
            let identity = if let Some(profile) = businesses.get(&id) {
                Identity::Business(profile.clone())
            } else if let Some(profile) = individuals.get(&id) {
                Identity::Individual(profile.clone())
            } else {
                Identity::Unknown
            };
            identities.insert(id, identity);
        }
        Ok(identities)
    }

    fn summarize(
        &self,
        thread: Thread,
        other_by_thread: &HashMap<String, String>,
        other_party: &HashMap<String, Identity>,
        last_messages: &HashMap<String, crate::models::MessagePreview>,
        subject_labels: &HashMap<String, String>,
    ) -> ThreadSummary {
        let other = other_by_thread
            .get(&thread.id)
            .and_then(|id| other_party.get(id))
            .cloned()
            .unwrap_or(Identity::Unknown);
        let last_message = last_messages.get(&thread.id).cloned();
        let last_activity = last_message
            .as_ref()
            .map(|m| m.sent_at)
            .unwrap_or(thread.created_at);

        ThreadSummary {
            thread_id: thread.id,
            other_party: other,
            subject_label: thread
                .subject_ref
                .as_ref()
                .and_then(|r| subject_labels.get(r))
                .cloned(),
            last_message,
            last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{AccessGate, TransactionOracle};
    use crate::store::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct AlwaysConfirmed;
    impl TransactionOracle for AlwaysConfirmed {
        fn is_confirmed(&self, _thread_id: &str) -> Result<bool, ChatError> {
            Ok(true)
        }
    }

    /// Counts calls so tests can pin the constant-query contract.
    #[derive(Default)]
    struct CountingDirectory {
        businesses: HashMap<String, Profile>,
        individuals: HashMap<String, Profile>,
        calls: AtomicUsize,
    }

    impl IdentityDirectory for CountingDirectory {
        fn lookup_businesses(
            &self,
            user_ids: &[String],
        ) -> Result<HashMap<String, Profile>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(user_ids
                .iter()
                .filter_map(|id| self.businesses.get(id).map(|p| (id.clone(), p.clone())))
                .collect())
        }

        fn lookup_individuals(
            &self,
            user_ids: &[String],
        ) -> Result<HashMap<String, Profile>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(user_ids
                .iter()
                .filter_map(|id| self.individuals.get(id).map(|p| (id.clone(), p.clone())))
                .collect())
        }
    }

    #[derive(Default)]
    struct CountingCatalog {
        labels: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl CatalogResolver for CountingCatalog {
        fn subject_labels(&self, refs: &[String]) -> Result<HashMap<String, String>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(refs
                .iter()
                .filter_map(|r| self.labels.get(r).map(|l| (r.clone(), l.clone())))
                .collect())
        }
    }

    fn profile(name: &str) -> Profile {
        Profile {
            display_name: name.to_string(),
            avatar_url: None,
        }
    }

    fn store(dir: &std::path::Path) -> Arc<ThreadStore> {
        let gate = Arc::new(AccessGate::new(Arc::new(AlwaysConfirmed)));
        Arc::new(ThreadStore::new(Database::open(dir).unwrap(), gate))
    }

    #[test]
    fn inbox_issues_a_constant_number_of_lookups() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        for i in 0..50 {
            let other = format!("provider-{i}");
            let thread = store.create_thread("alice", &other, Some("yoga-101")).unwrap();
            store.append(&thread.id, &other, "welcome!").unwrap();
        }

        let directory = Arc::new(CountingDirectory::default());
        let catalog = Arc::new(CountingCatalog::default());
        let aggregator = ThreadAggregator::new(store, directory.clone(), catalog.clone());

        let summaries = aggregator.inbox("alice").unwrap();
        assert_eq!(summaries.len(), 50);
        // One business batch + one individual batch, one catalog batch.
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_party_resolution_checks_business_then_individual() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let t_biz = store.create_thread("alice", "studio", None).unwrap();
        let t_ind = store.create_thread("alice", "bob", None).unwrap();
        let t_gone = store.create_thread("alice", "ghost", None).unwrap();

        let directory = Arc::new(CountingDirectory {
            businesses: HashMap::from([("studio".to_string(), profile("Yoga Studio"))]),
            individuals: HashMap::from([
                ("bob".to_string(), profile("Bob")),
                // A business id must not fall through to this namespace.
                ("studio".to_string(), profile("Studio The Person")),
            ]),
            calls: AtomicUsize::new(0),
        });
        let aggregator =
            ThreadAggregator::new(store, directory, Arc::new(CountingCatalog::default()));

        let summaries = aggregator.inbox("alice").unwrap();
        let by_thread: HashMap<&str, &Identity> = summaries
            .iter()
            .map(|s| (s.thread_id.as_str(), &s.other_party))
            .collect();

        assert_eq!(
            by_thread[t_biz.id.as_str()],
            &Identity::Business(profile("Yoga Studio"))
        );
        assert_eq!(
            by_thread[t_ind.id.as_str()],
            &Identity::Individual(profile("Bob"))
        );
        assert_eq!(by_thread[t_gone.id.as_str()], &Identity::Unknown);
        assert_eq!(by_thread[t_gone.id.as_str()].display_name(), "Unknown member");
    }

    #[test]
    fn inbox_sorts_by_last_activity_with_created_at_fallback() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let older = store.create_thread("alice", "bob", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer_empty = store.create_thread("alice", "carol", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        // A message in the older thread makes it the most recent.
        store.append(&older.id, "bob", "hello again").unwrap();

        let aggregator = ThreadAggregator::new(
            store,
            Arc::new(CountingDirectory::default()),
            Arc::new(CountingCatalog::default()),
        );
        let summaries = aggregator.inbox("alice").unwrap();

        assert_eq!(summaries[0].thread_id, older.id);
        assert_eq!(summaries[1].thread_id, newer_empty.id);
        assert_eq!(
            summaries[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("hello again")
        );
        assert!(summaries[1].last_message.is_none());
        assert_eq!(summaries[1].last_activity, newer_empty.created_at);
    }

    #[test]
    fn subject_labels_are_attached_when_resolvable() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let labelled = store.create_thread("alice", "bob", Some("yoga-101")).unwrap();
        let unlabelled = store.create_thread("alice", "carol", Some("gone-ref")).unwrap();

        let catalog = Arc::new(CountingCatalog {
            labels: HashMap::from([("yoga-101".to_string(), "Beginner Yoga".to_string())]),
            calls: AtomicUsize::new(0),
        });
        let aggregator =
            ThreadAggregator::new(store, Arc::new(CountingDirectory::default()), catalog);

        let summaries = aggregator.inbox("alice").unwrap();
        let by_thread: HashMap<&str, Option<&str>> = summaries
            .iter()
            .map(|s| (s.thread_id.as_str(), s.subject_label.as_deref()))
            .collect();
        assert_eq!(by_thread[labelled.id.as_str()], Some("Beginner Yoga"));
        assert_eq!(by_thread[unlabelled.id.as_str()], None);
    }
}
