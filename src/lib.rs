//! requery - an in-process query and mutation cache with stale-while-
//! revalidate semantics.
//!
//! The cache tracks one logical resource per `QueryKey` through
//! Idle/Loading/Success/Error, coalesces duplicate concurrent triggers onto
//! a single in-flight request per key, serves stale data while
//! revalidating in the background, and publishes every state change to
//! per-key subscriptions. Paginated ("infinite") queries and mutations
//! with invalidation side effects ride the same machinery.
//!
//! The crate ships with its own backend simulation: `UserStore` (an
//! in-memory, append-only mock database) and `MockApi` (fetchers with
//! artificial latency and a seedable failure injector). The demo binary
//! wires them to the cache and renders the result with the pure functions
//! in `ui`.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod models;
pub mod store;
pub mod ui;

pub use cache::{
    CacheError, InfiniteQuery, InfiniteState, Mutation, MutationState, MutationStatus, Query,
    QueryClient, QueryKey, QueryState, QueryStatus, Subscription,
};
pub use config::Config;
pub use fetch::{FailureInjector, FetchError, MockApi};
pub use models::{NewUser, Page, User};
pub use store::UserStore;
