//! Presentation layer: pure render functions and control predicates.
//!
//! Renders loading/error/success views of the cached state and decides
//! when the refetch, submit, and load-more controls are enabled.

pub mod render;

pub use render::{
    load_more_enabled, refetch_enabled, render_add_user, render_user_list, render_user_pages,
    submit_enabled,
};
