//! The simulated fetchers the cache consumes.
//!
//! `MockApi` plays the role of an API client: every call sleeps for the
//! configured artificial latency, then reads or appends to the shared
//! `UserStore`. The full-list fetch additionally runs the failure injector
//! to exercise the error rendering path.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::models::{NewUser, Page, User};
use crate::store::UserStore;

use super::{FailureInjector, FetchError};

// ============================================================================
// Constants
// ============================================================================

/// Artificial latency applied to every simulated call.
/// Matches the 1s delay of the demo this replaces.
pub const DEFAULT_LATENCY_MS: u64 = 1000;

/// Default failure rate for the full-list fetch (one call in ten).
pub const DEFAULT_FAILURE_RATE: f64 = 0.1;

/// Users per page for the paginated fetch.
/// Size 2 walks the five seed users in three pages.
pub const PAGE_SIZE: usize = 2;

/// Message carried by injected failures, surfaced verbatim in the UI.
pub const FETCH_FAILED_MSG: &str = "Failed to fetch users from local database";

/// Simulated API over the mock store.
/// Clone is cheap - the store and injector rng are shared via Arc.
#[derive(Clone)]
pub struct MockApi {
    store: Arc<UserStore>,
    latency: Duration,
    failures: FailureInjector,
}

impl MockApi {
    pub fn new(store: Arc<UserStore>, latency: Duration, failures: FailureInjector) -> Self {
        Self {
            store,
            latency,
            failures,
        }
    }

    /// Fetch the full current snapshot of the store.
    ///
    /// Fails when the injector draws a failure; a failed call leaves the
    /// store untouched and is independent of every other call.
    pub async fn fetch_users(&self) -> Result<Vec<User>, FetchError> {
        sleep(self.latency).await;

        if self.failures.should_fail() {
            debug!("injected failure on full-list fetch");
            return Err(FetchError::Failed(FETCH_FAILED_MSG.to_string()));
        }

        Ok(self.store.snapshot())
    }

    /// Fetch one page of `PAGE_SIZE` users.
    ///
    /// `None` requests the first page; otherwise the token must be one a
    /// previous page handed out. A token past the end of the store is
    /// rejected rather than clamped.
    pub async fn fetch_users_page(&self, token: Option<u32>) -> Result<Page, FetchError> {
        sleep(self.latency).await;

        let start = token.unwrap_or(0);
        match self.store.page(start, PAGE_SIZE) {
            Some(page) => Ok(page),
            None => {
                debug!(start, "rejected out-of-range page token");
                Err(FetchError::InvalidPageToken(start))
            }
        }
    }

    /// Append a newly constructed user to the store and return it.
    pub async fn create_user(&self, new: NewUser) -> Result<User, FetchError> {
        sleep(self.latency).await;
        Ok(self.store.insert(new))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn api(failures: FailureInjector) -> (Arc<UserStore>, MockApi) {
        let store = Arc::new(UserStore::with_seed_users());
        let api = MockApi::new(Arc::clone(&store), Duration::from_millis(1), failures);
        (store, api)
    }

    #[tokio::test]
    async fn test_fetch_users_returns_current_snapshot() {
        let (store, api) = api(FailureInjector::never());
        let users = api.fetch_users().await.expect("fetch succeeds");
        assert_eq!(users.len(), store.len());
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_message_and_leaves_store_intact() {
        let (store, api) = api(FailureInjector::always());
        let before = store.snapshot();

        let err = api.fetch_users().await.expect_err("injector always fails");

        assert_eq!(err.to_string(), FETCH_FAILED_MSG);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_pagination_walks_seed_data_to_exhaustion() {
        let (_store, api) = api(FailureInjector::never());

        let p0 = api.fetch_users_page(None).await.expect("page 0");
        assert_eq!(p0.ids(), vec![1, 2]);

        let p1 = api
            .fetch_users_page(p0.next_page_token)
            .await
            .expect("page 1");
        assert_eq!(p1.ids(), vec![3, 4]);

        let p2 = api
            .fetch_users_page(p1.next_page_token)
            .await
            .expect("page 2");
        assert_eq!(p2.ids(), vec![5]);
        assert_eq!(p2.next_page_token, None);
    }

    #[tokio::test]
    async fn test_out_of_range_token_is_an_error() {
        let (_store, api) = api(FailureInjector::never());
        let err = api.fetch_users_page(Some(9)).await.expect_err("past end");
        assert_eq!(err, FetchError::InvalidPageToken(9));
    }

    #[tokio::test]
    async fn test_create_user_appends_with_fresh_id() {
        let (store, api) = api(FailureInjector::never());

        let created = api
            .create_user(NewUser::new("Dana Lee", "dana@example.com", "Engineer"))
            .await
            .expect("create succeeds");

        assert_eq!(store.len(), 6);
        assert_eq!(created.id, 6);
    }
}
