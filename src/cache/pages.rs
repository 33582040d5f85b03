//! Paginated ("infinite") queries.
//!
//! One key holds an ordered sequence of pages. The next-page trigger asks
//! the fetcher for the token carried by the last page; pages concatenate in
//! fetch order and are never reordered or deduplicated. The single-flight
//! and subscription mechanics match plain queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fetch::FetchError;

use super::state::{fetched_age_display, outlived};
use super::{CacheError, QueryClient, QueryKey, QueryStatus, Subscription};

type PageFetcher<P> =
    Arc<dyn Fn(Option<u32>) -> BoxFuture<'static, Result<P, FetchError>> + Send + Sync>;
type NextToken<P> = Arc<dyn Fn(&P) -> Option<u32> + Send + Sync>;

// ============================================================================
// State
// ============================================================================

/// Observable state of one paginated query.
///
/// `pages` grows by one on each successful next-page fetch. A failed fetch
/// keeps the pages already loaded. `has_next` starts true (the first page
/// has not been requested yet) and goes permanently false once a page
/// without a token arrives, until a refetch resets the sequence.
#[derive(Debug, Clone)]
pub struct InfiniteState<P> {
    pub status: QueryStatus,
    pub pages: Vec<P>,
    pub has_next: bool,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
}

impl<P> InfiniteState<P> {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            pages: Vec::new(),
            has_next: true,
            error: None,
            fetched_at: None,
            is_fetching: false,
        }
    }

    /// Whether a further page exists to load.
    pub fn has_next_page(&self) -> bool {
        self.has_next
    }

    pub fn age_display(&self) -> String {
        fetched_age_display(self.fetched_at)
    }
}

// ============================================================================
// Core
// ============================================================================

struct InfiniteCore<P> {
    key: QueryKey,
    fetcher: PageFetcher<P>,
    next_token: NextToken<P>,
    tx: watch::Sender<InfiniteState<P>>,
    invalidated: AtomicBool,
    stale_after: Duration,
}

impl<P: Clone + Send + Sync + 'static> InfiniteCore<P> {
    fn new(
        key: QueryKey,
        fetcher: PageFetcher<P>,
        next_token: NextToken<P>,
        stale_after: Duration,
    ) -> Self {
        let (tx, _rx) = watch::channel(InfiniteState::idle());
        Self {
            key,
            fetcher,
            next_token,
            tx,
            invalidated: AtomicBool::new(false),
            stale_after,
        }
    }

    fn snapshot(&self) -> InfiniteState<P> {
        self.tx.borrow().clone()
    }

    fn is_stale(&self) -> bool {
        self.invalidated.load(Ordering::Relaxed)
            || outlived(self.tx.borrow().fetched_at, self.stale_after)
    }

    /// Fetch the next page (the first, when nothing is loaded yet).
    ///
    /// A no-op returning the current state when the sequence is exhausted
    /// or a flight is already out; the load-more control is disabled in
    /// both situations.
    async fn run_next(self: Arc<Self>) -> InfiniteState<P> {
        let mut token: Option<Option<u32>> = None;
        self.tx.send_if_modified(|state| {
            if state.is_fetching {
                return false;
            }
            let next = match state.pages.last() {
                None => None,
                Some(last) => match (self.next_token)(last) {
                    Some(t) => Some(t),
                    // Exhausted
                    None => return false,
                },
            };
            token = Some(next);
            state.is_fetching = true;
            if state.pages.is_empty() {
                state.status = QueryStatus::Loading;
            }
            true
        });

        let Some(token) = token else {
            return self.snapshot();
        };

        self.invalidated.store(false, Ordering::Relaxed);
        debug!(key = %self.key, ?token, "page fetch started");

        let result = (self.fetcher)(token).await;
        self.tx.send_modify(|state| {
            state.is_fetching = false;
            match result {
                Ok(page) => {
                    state.has_next = (self.next_token)(&page).is_some();
                    state.pages.push(page);
                    state.status = QueryStatus::Success;
                    state.error = None;
                    state.fetched_at = Some(Utc::now());
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "page fetch failed");
                    state.status = QueryStatus::Error;
                    state.error = Some(err.to_string());
                }
            }
        });

        self.snapshot()
    }

    /// Reset the sequence and fetch the first page fresh.
    /// Pages already loaded keep rendering until the new first page lands.
    async fn run_refresh(self: Arc<Self>) -> InfiniteState<P> {
        let became_owner = self.tx.send_if_modified(|state| {
            if state.is_fetching {
                return false;
            }
            state.is_fetching = true;
            if state.pages.is_empty() {
                state.status = QueryStatus::Loading;
            }
            true
        });

        if !became_owner {
            return self.wait_settled().await;
        }

        self.invalidated.store(false, Ordering::Relaxed);
        debug!(key = %self.key, "page refresh started");

        let result = (self.fetcher)(None).await;
        self.tx.send_modify(|state| {
            state.is_fetching = false;
            match result {
                Ok(page) => {
                    state.has_next = (self.next_token)(&page).is_some();
                    state.pages = vec![page];
                    state.status = QueryStatus::Success;
                    state.error = None;
                    state.fetched_at = Some(Utc::now());
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "page refresh failed");
                    state.status = QueryStatus::Error;
                    state.error = Some(err.to_string());
                }
            }
        });

        self.snapshot()
    }

    async fn wait_settled(&self) -> InfiniteState<P> {
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

    fn mark_invalid(self: Arc<Self>) {
        self.invalidated.store(true, Ordering::Relaxed);
        debug!(key = %self.key, "invalidated");

        if self.tx.receiver_count() == 0 {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    self.run_refresh().await;
                });
            }
            Err(_) => debug!(key = %self.key, "no runtime; refresh deferred to next trigger"),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to one paginated query. Clone is cheap; clones share the entry.
pub struct InfiniteQuery<P> {
    core: Arc<InfiniteCore<P>>,
}

impl<P> Clone for InfiniteQuery<P> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<P: Clone + Send + Sync + 'static> InfiniteQuery<P> {
    pub fn key(&self) -> &QueryKey {
        &self.core.key
    }

    pub fn state(&self) -> InfiniteState<P> {
        self.core.snapshot()
    }

    /// Mount-time trigger: fetch the first page if nothing is loaded,
    /// refresh in the background if the loaded sequence has gone stale.
    pub async fn ensure(&self) -> InfiniteState<P> {
        let state = self.state();
        match state.status {
            QueryStatus::Idle => Arc::clone(&self.core).run_next().await,
            QueryStatus::Success if !state.is_fetching && self.core.is_stale() => {
                let core = Arc::clone(&self.core);
                tokio::spawn(async move {
                    core.run_refresh().await;
                });
                state
            }
            _ => state,
        }
    }

    /// Load the page after the last one fetched. No-op when exhausted or
    /// while a fetch is already in flight.
    pub async fn fetch_next_page(&self) -> InfiniteState<P> {
        Arc::clone(&self.core).run_next().await
    }

    /// Throw the loaded sequence away and fetch page one fresh.
    pub async fn refetch(&self) -> InfiniteState<P> {
        Arc::clone(&self.core).run_refresh().await
    }

    pub fn subscribe(&self) -> Subscription<InfiniteState<P>> {
        Subscription::new(self.core.tx.subscribe())
    }
}

// ============================================================================
// Registration
// ============================================================================

impl QueryClient {
    /// Register (or re-attach to) the paginated query under `key`.
    ///
    /// `next_token` extracts the follow-up token from a fetched page;
    /// `None` marks the final page. First registration wins, as with
    /// [`QueryClient::query`].
    pub fn infinite_query<P, F, N>(
        &self,
        key: impl Into<QueryKey>,
        fetcher: F,
        next_token: N,
    ) -> Result<InfiniteQuery<P>, CacheError>
    where
        P: Clone + Send + Sync + 'static,
        F: Fn(Option<u32>) -> BoxFuture<'static, Result<P, FetchError>> + Send + Sync + 'static,
        N: Fn(&P) -> Option<u32> + Send + Sync + 'static,
    {
        let key = key.into();
        let stale_after = self.stale_after();
        let core = self.lookup_or_insert(key.clone(), || {
            let core = Arc::new(InfiniteCore::new(
                key,
                Arc::new(fetcher),
                Arc::new(next_token),
                stale_after,
            ));
            let hook = {
                let core = Arc::clone(&core);
                Box::new(move || Arc::clone(&core).mark_invalid()) as Box<dyn Fn() + Send + Sync>
            };
            (core, hook)
        })?;
        Ok(InfiniteQuery { core })
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
    use crate::models::Page;
    use crate::store::UserStore;

    fn paged_client() -> (Arc<UserStore>, QueryClient, InfiniteQuery<Page>) {
        let store = Arc::new(UserStore::with_seed_users());
        let api = MockApi::new(
            Arc::clone(&store),
            Duration::from_millis(1),
            FailureInjector::never(),
        );
        let client = QueryClient::new(Duration::from_secs(60));
        let pages = client
            .infinite_query(
                QueryKey::new(["users", "infinite"]),
                move |token| {
                    let api = api.clone();
                    async move { api.fetch_users_page(token).await }.boxed()
                },
                |page: &Page| page.next_page_token,
            )
            .expect("fresh key");
        (store, client, pages)
    }

    fn loaded_ids(state: &InfiniteState<Page>) -> Vec<i64> {
        state.pages.iter().flat_map(Page::ids).collect()
    }

    #[tokio::test]
    async fn test_load_next_page_exhausts_after_three_pages() {
        let (_store, _client, pages) = paged_client();

        let first = pages.ensure().await;
        assert_eq!(first.status, QueryStatus::Success);
        assert_eq!(loaded_ids(&first), vec![1, 2]);
        assert!(first.has_next_page());

        let second = pages.fetch_next_page().await;
        assert_eq!(loaded_ids(&second), vec![1, 2, 3, 4]);
        assert!(second.has_next_page());

        let third = pages.fetch_next_page().await;
        assert_eq!(loaded_ids(&third), vec![1, 2, 3, 4, 5]);
        assert!(!third.has_next_page());

        // Exhausted: further triggers are no-ops and the control stays off
        let after = pages.fetch_next_page().await;
        assert_eq!(after.pages.len(), 3);
        assert!(!after.has_next_page());
    }

    #[tokio::test]
    async fn test_pages_concatenate_in_fetch_order() {
        let (_store, _client, pages) = paged_client();
        pages.ensure().await;
        pages.fetch_next_page().await;
        let state = pages.fetch_next_page().await;

        let per_page: Vec<Vec<i64>> = state.pages.iter().map(Page::ids).collect();
        assert_eq!(per_page, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn test_refetch_resets_to_first_page() {
        let (_store, _client, pages) = paged_client();
        pages.ensure().await;
        pages.fetch_next_page().await;
        pages.fetch_next_page().await;

        let reset = pages.refetch().await;
        assert_eq!(reset.pages.len(), 1);
        assert_eq!(loaded_ids(&reset), vec![1, 2]);
        assert!(reset.has_next_page());
    }

    #[tokio::test]
    async fn test_concurrent_next_page_triggers_fetch_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let pages = client
            .infinite_query(
                QueryKey::new(["counted", "infinite"]),
                {
                    let calls = Arc::clone(&calls);
                    move |token| {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            let start = token.unwrap_or(0);
                            Ok::<Page, FetchError>(Page {
                                users: Vec::new(),
                                next_page_token: Some(start + 1),
                            })
                        }
                        .boxed()
                    }
                },
                |page: &Page| page.next_page_token,
            )
            .expect("fresh key");

        let (a, b) = tokio::join!(pages.fetch_next_page(), pages.fetch_next_page());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The coalesced trigger observed the in-flight state untouched
        assert!(a.pages.len() == 1 || b.pages.len() == 1);
    }

    #[tokio::test]
    async fn test_failed_page_fetch_keeps_loaded_pages() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = QueryClient::new(Duration::from_secs(60));
        let pages = client
            .infinite_query(
                QueryKey::new(["flaky", "infinite"]),
                {
                    let calls = Arc::clone(&calls);
                    move |_token| {
                        let calls = Arc::clone(&calls);
                        async move {
                            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                                Ok(Page {
                                    users: Vec::new(),
                                    next_page_token: Some(2),
                                })
                            } else {
                                Err(FetchError::Failed("boom".to_string()))
                            }
                        }
                        .boxed()
                    }
                },
                |page: &Page| page.next_page_token,
            )
            .expect("fresh key");

        pages.ensure().await;
        let failed = pages.fetch_next_page().await;

        assert_eq!(failed.status, QueryStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.pages.len(), 1);
    }
}
