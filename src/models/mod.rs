//! Data models for the mock user domain.
//!
//! - `User`, `NewUser`: the records the demo lists and creates
//! - `Page`: a slice of the store plus the token for the next slice

pub mod page;
pub mod user;

pub use page::Page;
pub use user::{NewUser, User};
