//! The in-memory mock store backing the simulated fetchers.
//!
//! `UserStore` stands in for a real database: an append-only list of users,
//! seeded with five records and grown only by the add-user mutation.

pub mod users;

pub use users::UserStore;
