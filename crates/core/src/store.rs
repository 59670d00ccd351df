//! The per-round pending-request store.

use quarry_api::{BlockedFetch, DataSource, PerformFetch};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A blocked fetch with its request type erased for storage.
pub(crate) type ErasedBlockedFetch = Box<dyn Any + Send>;

/// Object-safe view of a data source.
///
/// The store holds one of these per bucket so that batches of different
/// request types can live in one map; `fetch_erased` recovers the typed
/// batch, which is safe because a bucket only ever receives fetches
/// queued through the same source handle.
pub(crate) trait ErasedSource: Send + Sync + std::fmt::Debug {
    /// Name of the underlying source.
    fn name(&self) -> &str;

    /// Downcast the batch back to its typed form and hand it to the
    /// underlying source's batch handler.
    fn fetch_erased(&self, batch: Vec<ErasedBlockedFetch>)
        -> Vec<PerformFetch>;
}

#[derive(Debug)]
struct SourceHandle<S: DataSource> {
    source: Arc<S>,
}

impl<S: DataSource> SourceHandle<S> {
    fn erase(source: Arc<S>) -> Arc<dyn ErasedSource> {
        Arc::new(Self { source })
    }
}

impl<S: DataSource> ErasedSource for SourceHandle<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn fetch_erased(
        &self,
        batch: Vec<ErasedBlockedFetch>,
    ) -> Vec<PerformFetch> {
        let batch = batch
            .into_iter()
            .map(|fetch| {
                *fetch
                    .downcast::<BlockedFetch<S::Request>>()
                    .expect("request store bucket holds a foreign request type")
            })
            .collect();
        self.source.fetch(batch)
    }
}

/// One source's pending batch for the current round.
pub(crate) struct SourceBatch {
    pub source: Arc<dyn ErasedSource>,
    pub fetches: Vec<ErasedBlockedFetch>,
}

impl std::fmt::Debug for SourceBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBatch")
            .field("source", &self.source.name())
            .field("fetches", &self.fetches.len())
            .finish()
    }
}

/// Groups not-yet-issued requests by source until the round's drain.
///
/// Buckets are keyed by the identity of the application's `Arc<S>`
/// allocation, so distinct source instances never share a batch while
/// clones of one handle always do.
#[derive(Debug, Default)]
pub(crate) struct RequestStore {
    buckets: Mutex<HashMap<usize, SourceBatch>>,
}

impl RequestStore {
    /// Queue a blocked fetch under its source's bucket.
    pub fn add<S: DataSource>(
        &self,
        source: &Arc<S>,
        fetch: BlockedFetch<S::Request>,
    ) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(Arc::as_ptr(source) as usize)
            .or_insert_with(|| SourceBatch {
                source: SourceHandle::erase(source.clone()),
                fetches: Vec::new(),
            })
            .fetches
            .push(Box::new(fetch));
    }

    /// Take every batch queued since the last call, leaving the store
    /// empty for the next round.
    pub fn take_batches(&self) -> Vec<SourceBatch> {
        self.buckets
            .lock()
            .unwrap()
            .drain()
            .map(|(_, batch)| batch)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quarry_api::{Request, RequestId, ResultCell};

    #[derive(Debug, Clone)]
    struct Key(&'static str);

    impl Request for Key {
        type Value = String;

        fn identifier(&self) -> RequestId {
            self.0.into()
        }
    }

    #[derive(Debug)]
    struct Echo;

    impl DataSource for Echo {
        type Request = Key;

        fn name(&self) -> &str {
            "echo"
        }

        fn fetch(
            &self,
            batch: Vec<BlockedFetch<Key>>,
        ) -> Vec<PerformFetch> {
            vec![PerformFetch::Sync(Box::new(move || {
                for fetch in batch {
                    fetch.put_success(fetch.request().0.to_string());
                }
            }))]
        }
    }

    fn blocked(key: &'static str) -> BlockedFetch<Key> {
        BlockedFetch::new(Key(key), Arc::new(ResultCell::new()))
    }

    #[test]
    fn same_handle_shares_a_bucket() {
        let store = RequestStore::default();
        let echo = Arc::new(Echo);
        store.add(&echo, blocked("a"));
        store.add(&echo.clone(), blocked("b"));

        let batches = store.take_batches();
        assert_eq!(1, batches.len());
        assert_eq!(2, batches[0].fetches.len());
        assert_eq!("echo", batches[0].source.name());
    }

    #[test]
    fn distinct_instances_get_distinct_buckets() {
        let store = RequestStore::default();
        let one = Arc::new(Echo);
        let two = Arc::new(Echo);
        store.add(&one, blocked("a"));
        store.add(&two, blocked("b"));

        let batches = store.take_batches();
        assert_eq!(2, batches.len());
    }

    #[test]
    fn take_leaves_the_store_empty() {
        let store = RequestStore::default();
        let echo = Arc::new(Echo);
        store.add(&echo, blocked("a"));
        assert_eq!(1, store.take_batches().len());
        assert!(store.take_batches().is_empty());
    }

    #[test]
    fn erased_batch_round_trips_through_the_source() {
        let store = RequestStore::default();
        let echo = Arc::new(Echo);
        let cell = Arc::new(ResultCell::new());
        store.add(&echo, BlockedFetch::new(Key("a"), cell.clone()));

        for batch in store.take_batches() {
            for task in batch.source.fetch_erased(batch.fetches) {
                match task {
                    PerformFetch::Sync(thunk) => thunk(),
                    PerformFetch::Async(_) => panic!("echo is sync"),
                }
            }
        }

        match cell.state() {
            quarry_api::FetchState::Success(v) => {
                assert_eq!("a", v.downcast::<String>().unwrap().as_str());
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
