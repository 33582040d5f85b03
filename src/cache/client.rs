//! The query cache: keyed, type-erased entries with single-flight fetches,
//! staleness tracking, invalidation, and per-key subscriptions.
//!
//! `QueryClient` owns the key map; `Query<T>` is a cheap handle to one
//! entry. The watch channel inside each entry is both the published state
//! and the synchronization point: becoming the flight owner is an atomic
//! test-and-set on `is_fetching`, so duplicate concurrent triggers coalesce
//! onto one outstanding request per key.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fetch::FetchError;

use super::{CacheError, QueryKey, QueryState, QueryStatus, Subscription};
use super::state::outlived;

pub(crate) type Fetcher<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

// ============================================================================
// Client
// ============================================================================

/// Handle to the cache. Clone is cheap and all clones share the key map.
///
/// Constructed explicitly (no process-wide instance); dropping the last
/// clone tears down every entry and wakes pending subscribers with
/// `CacheError::Closed`.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    stale_after: Duration,
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

struct Entry {
    core: Arc<dyn Any + Send + Sync>,
    invalidate: Box<dyn Fn() + Send + Sync>,
}

impl QueryClient {
    /// Create a cache whose successful results go stale after `stale_after`.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                stale_after,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn stale_after(&self) -> Duration {
        self.inner.stale_after
    }

    /// Register (or re-attach to) the query under `key`.
    ///
    /// The first registration wins: a later call with the same key returns a
    /// handle to the existing entry and its original fetcher. Requesting an
    /// existing key at a different payload type is a caller bug surfaced as
    /// `CacheError::KeyTypeMismatch`.
    pub fn query<T, F>(&self, key: impl Into<QueryKey>, fetcher: F) -> Result<Query<T>, CacheError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync + 'static,
    {
        let key = key.into();
        let stale_after = self.stale_after();
        let core = self.lookup_or_insert(key.clone(), || {
            let core = Arc::new(QueryCore::new(key, Arc::new(fetcher), stale_after));
            let hook = {
                let core = Arc::clone(&core);
                Box::new(move || Arc::clone(&core).mark_invalid()) as Box<dyn Fn() + Send + Sync>
            };
            (core, hook)
        })?;
        Ok(Query { core })
    }

    /// Mark `key` stale. If the key currently has subscribers (it is being
    /// rendered), a background refetch starts immediately; otherwise the
    /// next `ensure` picks the staleness up.
    pub fn invalidate(&self, key: &QueryKey) {
        let entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) => (entry.invalidate)(),
            None => debug!(key = %key, "invalidate on unregistered key"),
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared registration path for plain and paginated entries.
    pub(crate) fn lookup_or_insert<C>(
        &self,
        key: QueryKey,
        build: impl FnOnce() -> (Arc<C>, Box<dyn Fn() + Send + Sync>),
    ) -> Result<Arc<C>, CacheError>
    where
        C: Any + Send + Sync,
    {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(&key) {
            return Arc::clone(&entry.core)
                .downcast::<C>()
                .map_err(|_| CacheError::KeyTypeMismatch(key));
        }

        let (core, invalidate) = build();
        let erased: Arc<dyn Any + Send + Sync> = Arc::clone(&core) as Arc<dyn Any + Send + Sync>;
        entries.insert(
            key,
            Entry {
                core: erased,
                invalidate,
            },
        );
        Ok(core)
    }
}

// ============================================================================
// Query core
// ============================================================================

pub(crate) struct QueryCore<T> {
    key: QueryKey,
    fetcher: Fetcher<T>,
    tx: watch::Sender<QueryState<T>>,
    invalidated: AtomicBool,
    stale_after: Duration,
}

impl<T: Send + Sync + 'static> QueryCore<T> {
    fn new(key: QueryKey, fetcher: Fetcher<T>, stale_after: Duration) -> Self {
        let (tx, _rx) = watch::channel(QueryState::idle());
        Self {
            key,
            fetcher,
            tx,
            invalidated: AtomicBool::new(false),
            stale_after,
        }
    }

    fn snapshot(&self) -> QueryState<T> {
        self.tx.borrow().clone()
    }

    fn is_stale(&self) -> bool {
        self.invalidated.load(Ordering::Relaxed)
            || outlived(self.tx.borrow().fetched_at, self.stale_after)
    }

    /// Run one fetch, or coalesce onto the flight already out.
    ///
    /// Exactly one caller wins the test-and-set on `is_fetching`; everyone
    /// else waits for that flight to settle and observes its result. The
    /// flight always completes and publishes even if every handle and
    /// subscription is dropped meanwhile (no cancellation).
    async fn run(self: Arc<Self>) -> QueryState<T> {
        let became_owner = self.tx.send_if_modified(|state| {
            if state.is_fetching {
                return false;
            }
            state.is_fetching = true;
            if state.data.is_none() {
                state.status = QueryStatus::Loading;
            }
            true
        });

        if !became_owner {
            return self.wait_settled().await;
        }

        // Cleared at flight start: an invalidation that lands mid-flight
        // stays pending and is honored by the next ensure.
        self.invalidated.store(false, Ordering::Relaxed);
        debug!(key = %self.key, "fetch started");

        let result = (self.fetcher)().await;
        self.tx.send_modify(|state| {
            state.is_fetching = false;
            match result {
                Ok(data) => {
                    state.status = QueryStatus::Success;
                    state.data = Some(Arc::new(data));
                    state.error = None;
                    state.fetched_at = Some(Utc::now());
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "fetch failed");
                    state.status = QueryStatus::Error;
                    state.error = Some(err.to_string());
                }
            }
        });

        self.snapshot()
    }

    async fn wait_settled(&self) -> QueryState<T> {
        let mut rx = self.tx.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_fetching {
                return state;
            }
            if rx.changed().await.is_err() {
                return state;
            }
        }
    }

    /// Invalidation hook: mark stale and, when anyone is subscribed,
    /// refetch in the background.
    fn mark_invalid(self: Arc<Self>) {
        self.invalidated.store(true, Ordering::Relaxed);
        debug!(key = %self.key, "invalidated");

        if self.tx.receiver_count() == 0 {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    self.run().await;
                });
            }
            Err(_) => debug!(key = %self.key, "no runtime; refetch deferred to next trigger"),
        }
    }
}

// ============================================================================
// Query handle
// ============================================================================

/// Handle to one cached query. Clone is cheap; clones share the entry.
pub struct Query<T> {
    core: Arc<QueryCore<T>>,
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("key", &self.core.key).finish()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn key(&self) -> &QueryKey {
        &self.core.key
    }

    /// The current published state.
    pub fn state(&self) -> QueryState<T> {
        self.core.snapshot()
    }

    /// Mount-time trigger.
    ///
    /// Never fetched: fetch in the foreground and return the settled state.
    /// Stale or invalidated success: start a background revalidation and
    /// keep serving the current value. Errors are not retried here; the
    /// refetch control is the retry path.
    pub async fn ensure(&self) -> QueryState<T> {
        let state = self.state();
        match state.status {
            QueryStatus::Idle => Arc::clone(&self.core).run().await,
            QueryStatus::Success if !state.is_fetching && self.core.is_stale() => {
                let core = Arc::clone(&self.core);
                tokio::spawn(async move {
                    core.run().await;
                });
                state
            }
            _ => state,
        }
    }

    /// Force a fetch now, coalescing onto an in-flight one if present.
    /// Prior data keeps being served until the new result settles.
    pub async fn refetch(&self) -> QueryState<T> {
        Arc::clone(&self.core).run().await
    }

    /// Subscribe to every state change of this key.
    pub fn subscribe(&self) -> Subscription<QueryState<T>> {
        Subscription::new(self.core.tx.subscribe())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use futures::FutureExt;

    use crate::fetch::{FailureInjector, MockApi};
    use crate::models::{Page, User};
    use crate::store::UserStore;

    fn counting_fetcher(
        calls: Arc<AtomicU32>,
        delay_ms: u64,
    ) -> impl Fn() -> BoxFuture<'static, Result<Vec<u32>, FetchError>> + Send + Sync + 'static {
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(vec![n])
            }
            .boxed()
        }
    }

    fn user_list_fetcher(
        api: MockApi,
    ) -> impl Fn() -> BoxFuture<'static, Result<Vec<User>, FetchError>> + Send + Sync + 'static
    {
        move || {
            let api = api.clone();
            async move { api.fetch_users().await }.boxed()
        }
    }

    #[tokio::test]
    async fn test_ensure_fetches_idle_query_and_matches_store_length() {
        let store = Arc::new(UserStore::with_seed_users());
        let api = MockApi::new(
            Arc::clone(&store),
            Duration::from_millis(1),
            FailureInjector::never(),
        );
        let client = QueryClient::new(Duration::from_secs(60));
        let users = client
            .query(QueryKey::from("users"), user_list_fetcher(api))
            .expect("fresh key");

        let state = users.ensure().await;

        assert_eq!(state.status, QueryStatus::Success);
        let data = state.data.expect("data present");
        assert_eq!(data.len(), store.len());
        assert!(state.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce_to_one_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let query = client
            .query(QueryKey::from("counted"), counting_fetcher(Arc::clone(&calls), 20))
            .expect("fresh key");

        let (a, b, c) = tokio::join!(query.refetch(), query.refetch(), query.refetch());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for state in [a, b, c] {
            assert_eq!(state.status, QueryStatus::Success);
            assert_eq!(*state.data.expect("data"), vec![1]);
        }
    }

    #[tokio::test]
    async fn test_stale_success_is_served_while_revalidating() {
        let calls = Arc::new(AtomicU32::new(0));
        // Zero stale time: every success is immediately stale
        let client = QueryClient::new(Duration::ZERO);
        let query = client
            .query(QueryKey::from("counted"), counting_fetcher(Arc::clone(&calls), 1))
            .expect("fresh key");

        let first = query.refetch().await;
        assert_eq!(*first.data.expect("data"), vec![1]);

        // Stale mount: old value served immediately, refresh in background
        let served = query.ensure().await;
        assert_eq!(*served.data.expect("data"), vec![1]);

        let mut sub = query.subscribe();
        loop {
            let state = sub.current();
            if state.data.as_deref() == Some(&vec![2]) && !state.is_fetching {
                break;
            }
            sub.changed().await.expect("query alive");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_data_and_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let query = client
            .query(QueryKey::from("flaky"), {
                let calls = Arc::clone(&calls);
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Ok(vec![1u32])
                        } else {
                            Err(FetchError::Failed("boom".to_string()))
                        }
                    }
                    .boxed()
                }
            })
            .expect("fresh key");

        let ok = query.refetch().await;
        assert_eq!(ok.status, QueryStatus::Success);

        let failed = query.refetch().await;
        assert_eq!(failed.status, QueryStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        // Stale-while-revalidate: the old value is still there to render
        assert_eq!(*failed.data.expect("prior data survives"), vec![1]);
    }

    #[tokio::test]
    async fn test_error_is_not_retried_by_ensure() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let query = client
            .query(QueryKey::from("down"), {
                let calls = Arc::clone(&calls);
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<Vec<u32>, _>(FetchError::Failed("down".to_string()))
                    }
                    .boxed()
                }
            })
            .expect("fresh key");

        let first = query.ensure().await;
        assert_eq!(first.status, QueryStatus::Error);

        let second = query.ensure().await;
        assert_eq!(second.status, QueryStatus::Error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The refetch control is the retry path
        query.refetch().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_with_subscriber_triggers_background_refetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let key = QueryKey::from("counted");
        let query = client
            .query(key.clone(), counting_fetcher(Arc::clone(&calls), 1))
            .expect("fresh key");

        query.refetch().await;
        let mut sub = query.subscribe();

        client.invalidate(&key);

        loop {
            let state = sub.current();
            if state.data.as_deref() == Some(&vec![2]) && !state.is_fetching {
                break;
            }
            sub.changed().await.expect("query alive");
        }
    }

    #[tokio::test]
    async fn test_invalidate_without_subscribers_defers_to_next_ensure() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let key = QueryKey::from("counted");
        let query = client
            .query(key.clone(), counting_fetcher(Arc::clone(&calls), 1))
            .expect("fresh key");

        query.refetch().await;
        client.invalidate(&key);

        // No subscriber: nothing in flight yet
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!query.state().is_fetching);

        // ensure sees the invalidation and revalidates in the background
        query.ensure().await;
        let mut sub = query.subscribe();
        loop {
            let state = sub.current();
            if state.data.as_deref() == Some(&vec![2]) && !state.is_fetching {
                break;
            }
            sub.changed().await.expect("query alive");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_type_mismatch_is_rejected() {
        let client = QueryClient::new(Duration::from_secs(60));
        let key = QueryKey::from("users");
        let _first = client
            .query::<Vec<User>, _>(key.clone(), || {
                async { Ok::<Vec<User>, FetchError>(Vec::new()) }.boxed()
            })
            .expect("fresh key");

        let err = client
            .query::<Page, _>(key, || {
                async {
                    Ok::<Page, FetchError>(Page {
                        users: Vec::new(),
                        next_page_token: None,
                    })
                }
                .boxed()
            })
            .expect_err("same key, different payload type");

        assert!(matches!(err, CacheError::KeyTypeMismatch(_)));
    }

    #[tokio::test]
    async fn test_reattaching_returns_the_existing_entry() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let key = QueryKey::from("counted");
        let first = client
            .query(key.clone(), counting_fetcher(Arc::clone(&calls), 1))
            .expect("fresh key");
        first.refetch().await;

        // Second registration re-attaches; its fetcher is ignored
        let second = client
            .query::<Vec<u32>, _>(key, counting_fetcher(Arc::clone(&calls), 1))
            .expect("same type");
        assert_eq!(second.state().status, QueryStatus::Success);
        assert_eq!(*second.state().data.expect("shared data"), vec![1]);
    }
}
