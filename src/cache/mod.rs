//! Keyed query cache with stale-while-revalidate semantics.
//!
//! For each `QueryKey` the cache tracks one logical resource through
//! Idle/Loading/Success/Error, guarantees at most one in-flight request per
//! key, serves stale data while revalidating, and publishes every state
//! change to per-key subscriptions. Paginated queries and mutations ride
//! the same machinery.

pub mod client;
pub mod error;
pub mod key;
pub mod mutation;
pub mod pages;
pub mod state;
pub mod subscription;

pub use client::{Query, QueryClient};
pub use error::CacheError;
pub use key::QueryKey;
pub use mutation::{Mutation, MutationState, MutationStatus};
pub use pages::{InfiniteQuery, InfiniteState};
pub use state::{fetched_age_display, QueryState, QueryStatus};
pub use subscription::Subscription;
