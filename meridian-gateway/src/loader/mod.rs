//! Request-scoped, batched data loading.
//!
//! Every resolver that needs backend data goes through a [`BatchLoader`]
//! rather than fetching directly. Loads issued while the current resolution
//! wave is still running are collected into a single batch and dispatched
//! once, so a list of a hundred artworks costs one backend call for their
//! hundred partners instead of a hundred calls.
//!
//! The loader guarantees:
//!
//! * results come back in the same order as the requested keys, regardless of
//!   how the backend orders its response internally (the [`BatchFetch`]
//!   implementation owns that contract, and the loader verifies the length);
//! * with caching enabled (the default), a given key is fetched at most once
//!   per loader instance, i.e. at most once per operation when loaders are
//!   registered on the per-request [`crate::Context`];
//! * a failing batch fails every key in it with the same error. There is no
//!   partial success at this layer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedRwLockWriteGuard;
use tokio::sync::RwLock;

use crate::error::FetchError;

/// A key a [`BatchLoader`] can group fetches by.
///
/// Grouping and deduplication are by *serialized* identity: two keys that
/// serialize identically are the same request. Composite key types (an id
/// plus the caller's access token, say) satisfy this because struct field
/// order is fixed by the type definition.
pub trait LoadKey: Clone + Eq + Hash + Serialize + Send + Sync + 'static {}

impl<T> LoadKey for T where T: Clone + Eq + Hash + Serialize + Send + Sync + 'static {}

/// A batch fetch function injected into a [`BatchLoader`].
///
/// The output MUST contain exactly one value per input key, in the same
/// order as the input keys. The loader does not reorder results itself; it
/// does verify the length and fails the whole batch on a mismatch.
#[async_trait]
pub trait BatchFetch: Send + Sync + 'static {
    type Key: LoadKey;
    type Value: Clone + Send + Sync + 'static;

    async fn fetch(&self, keys: &[Self::Key]) -> Result<Vec<Self::Value>, FetchError>;
}

/// One wait-map slot: `None` while the batch is in flight, filled exactly
/// once when the batch publishes.
type Entry<V> = Arc<RwLock<Option<Result<V, FetchError>>>>;

struct PendingKey<K, V> {
    key: K,
    serialized: String,
    slot: OwnedRwLockWriteGuard<Option<Result<V, FetchError>>>,
}

struct State<K, V> {
    wait_map: HashMap<String, Entry<V>>,
    batch: Vec<PendingKey<K, V>>,
    dispatch_scheduled: bool,
}

impl<K, V> Default for State<K, V> {
    fn default() -> Self {
        Self {
            wait_map: HashMap::new(),
            batch: Vec::new(),
            dispatch_scheduled: false,
        }
    }
}

/// A keyed, deduplicating, request-scoped batch loader.
///
/// Cloning is cheap and clones share the same batch collection window and
/// cache; construct one loader per backend concern per operation.
pub struct BatchLoader<F: BatchFetch> {
    name: Arc<String>,
    caching: bool,
    fetcher: Arc<F>,
    state: Arc<Mutex<State<F::Key, F::Value>>>,
}

impl<F: BatchFetch> Clone for BatchLoader<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            caching: self.caching,
            fetcher: self.fetcher.clone(),
            state: self.state.clone(),
        }
    }
}

impl<F: BatchFetch> BatchLoader<F> {
    /// Create a caching loader. The name is used in errors and logs.
    pub fn new(name: impl Into<String>, fetcher: F) -> Self {
        Self {
            name: Arc::new(name.into()),
            caching: true,
            fetcher: Arc::new(fetcher),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Create a loader that still batches and deduplicates within one
    /// collection window, but forgets results once a batch publishes.
    ///
    /// Use this for data that must be re-read on every access, e.g. values
    /// that another mutation in the same operation may have changed.
    pub fn uncached(name: impl Into<String>, fetcher: F) -> Self {
        Self {
            caching: false,
            ..Self::new(name, fetcher)
        }
    }

    /// Load the value for one key.
    ///
    /// All `load` calls that run before the batch dispatch task gets polled
    /// (one cooperative yield after the first key of a window) join the same
    /// batch and cost a single [`BatchFetch::fetch`] call.
    pub async fn load(&self, key: F::Key) -> Result<F::Value, FetchError> {
        let serialized = serde_json::to_string(&key).map_err(|e| FetchError::MalformedRequest {
            reason: format!("could not serialize load key: {e}"),
        })?;

        let entry = {
            let mut state = self.state.lock();
            match state.wait_map.get(&serialized) {
                // Either resolved already (caching) or still in flight:
                // both are "wait for the slot to be readable".
                Some(entry) => entry.clone(),
                None => {
                    let entry: Entry<F::Value> = Arc::new(RwLock::new(None));
                    let slot = entry
                        .clone()
                        .try_write_owned()
                        .expect("lock was just created");
                    state.wait_map.insert(serialized.clone(), entry.clone());
                    state.batch.push(PendingKey {
                        key,
                        serialized,
                        slot,
                    });
                    if !state.dispatch_scheduled {
                        state.dispatch_scheduled = true;
                        let loader = self.clone();
                        tokio::spawn(async move { loader.dispatch().await });
                    }
                    entry
                }
            }
        };

        // Parked until the batch holding our slot publishes; immediate for a
        // cached entry.
        let result = entry.read().await.clone();
        match result {
            Some(result) => result,
            // The dispatch task was dropped before it could publish, e.g. at
            // executor shutdown. Surfaced as an error rather than a panic so
            // unrelated waiters on the same operation can still complete.
            None => Err(FetchError::SubrequestBatchingError {
                service: self.name.as_ref().clone(),
                reason: "batch was dropped before completion".to_string(),
            }),
        }
    }

    /// Load the values for many keys, preserving input order.
    pub async fn load_many(
        &self,
        keys: impl IntoIterator<Item = F::Key>,
    ) -> Result<Vec<F::Value>, FetchError> {
        futures::future::try_join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    async fn dispatch(&self) {
        // Let the rest of the current resolution wave enqueue its keys.
        tokio::task::yield_now().await;

        let batch = {
            let mut state = self.state.lock();
            state.dispatch_scheduled = false;
            std::mem::take(&mut state.batch)
        };
        if batch.is_empty() {
            return;
        }

        let keys: Vec<F::Key> = batch.iter().map(|pending| pending.key.clone()).collect();
        tracing::debug!(
            loader = self.name.as_str(),
            batch_size = keys.len(),
            "dispatching batch"
        );

        let outcome = match self.fetcher.fetch(&keys).await {
            Ok(values) if values.len() == keys.len() => Ok(values),
            Ok(values) => {
                tracing::warn!(
                    loader = self.name.as_str(),
                    expected = keys.len(),
                    actual = values.len(),
                    "batch fetch broke the one-value-per-key contract"
                );
                Err(FetchError::SubrequestBatchingError {
                    service: self.name.as_ref().clone(),
                    reason: format!(
                        "batch fetch returned {} results for {} keys",
                        values.len(),
                        keys.len()
                    ),
                })
            }
            Err(e) => Err(e),
        };

        if !self.caching {
            // Remove before publishing: a load racing with publication must
            // open a fresh batch, not observe a value we are about to forget.
            let mut state = self.state.lock();
            for pending in &batch {
                state.wait_map.remove(&pending.serialized);
            }
        }

        match outcome {
            Ok(values) => {
                for (mut pending, value) in batch.into_iter().zip(values) {
                    *pending.slot = Some(Ok(value));
                }
            }
            Err(e) => {
                // A batch is all-or-nothing: every key gets the same error.
                for mut pending in batch {
                    *pending.slot = Some(Err(e.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    /// Echoes `{key}` back as `value:{key}`, recording every batch it sees.
    struct RecordingFetch {
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingFetch {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BatchFetch for RecordingFetch {
        type Key = String;
        type Value = String;

        async fn fetch(&self, keys: &[String]) -> Result<Vec<String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(keys.to_vec());
            // Yield so concurrent batches interleave like real backend calls.
            tokio::task::yield_now().await;
            Ok(keys.iter().map(|key| format!("value:{key}")).collect())
        }
    }

    struct FailingFetch;

    #[async_trait]
    impl BatchFetch for FailingFetch {
        type Key = String;
        type Value = String;

        async fn fetch(&self, _keys: &[String]) -> Result<Vec<String>, FetchError> {
            Err(FetchError::SubrequestHttpError {
                status_code: Some(503),
                service: "catalog".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct ShortFetch;

    #[async_trait]
    impl BatchFetch for ShortFetch {
        type Key = String;
        type Value = String;

        async fn fetch(&self, keys: &[String]) -> Result<Vec<String>, FetchError> {
            Ok(keys.iter().take(1).cloned().collect())
        }
    }

    #[test_log::test(tokio::test)]
    async fn loads_in_one_wave_share_a_single_batch() {
        let loader = BatchLoader::new("recording", RecordingFetch::new());

        let (a, b, a_again) = tokio::join!(
            loader.load("a".to_string()),
            loader.load("b".to_string()),
            loader.load("a".to_string()),
        );

        assert_eq!(a.unwrap(), "value:a");
        assert_eq!(b.unwrap(), "value:b");
        assert_eq!(a_again.unwrap(), "value:a");

        assert_eq!(loader.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *loader.fetcher.batches.lock(),
            vec![vec!["a".to_string(), "b".to_string()]]
        );
    }

    #[tokio::test]
    async fn load_many_preserves_input_order() {
        let loader = BatchLoader::new("recording", RecordingFetch::new());

        let values = loader
            .load_many(["c".to_string(), "a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(values, vec!["value:c", "value:a", "value:b"]);
        assert_eq!(loader.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caching_resolves_later_loads_without_refetching() {
        let loader = BatchLoader::new("recording", RecordingFetch::new());

        assert_eq!(loader.load("a".to_string()).await.unwrap(), "value:a");
        assert_eq!(loader.load("a".to_string()).await.unwrap(), "value:a");

        assert_eq!(loader.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uncached_loader_refetches_in_later_waves() {
        let loader = BatchLoader::uncached("recording", RecordingFetch::new());

        assert_eq!(loader.load("a".to_string()).await.unwrap(), "value:a");
        assert_eq!(loader.load("a".to_string()).await.unwrap(), "value:a");

        assert_eq!(loader.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failed_batch_fails_every_key_with_the_same_error() {
        let loader = BatchLoader::new("failing", FailingFetch);

        let (a, b) = tokio::join!(loader.load("a".to_string()), loader.load("b".to_string()));

        let a = a.unwrap_err();
        let b = b.unwrap_err();
        assert_eq!(a, b);
        assert_eq!(a.status_code(), Some(503));
    }

    #[test_log::test(tokio::test)]
    async fn a_short_batch_response_is_rejected() {
        let loader = BatchLoader::new("short", ShortFetch);

        let (a, b) = tokio::join!(loader.load("a".to_string()), loader.load("b".to_string()));

        for result in [a, b] {
            match result.unwrap_err() {
                FetchError::SubrequestBatchingError { service, reason } => {
                    assert_eq!(service, "short");
                    assert_eq!(reason, "batch fetch returned 1 results for 2 keys");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn separate_loaders_do_not_share_caches() {
        let first = BatchLoader::new("one", RecordingFetch::new());
        let second = BatchLoader::new("two", RecordingFetch::new());

        first.load("a".to_string()).await.unwrap();
        second.load("a".to_string()).await.unwrap();

        assert_eq!(first.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
