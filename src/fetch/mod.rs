//! Simulated fetchers over the mock store.
//!
//! This module provides `MockApi`, the stand-in for a real API client:
//! artificial latency on every call, a seedable random failure injector on
//! the full-list fetch, and a paginated fetch in slices of two.

pub mod api;
pub mod error;
pub mod failure;

pub use api::MockApi;
pub use error::FetchError;
pub use failure::FailureInjector;
