//! Plain-text renderers over cache and mutation state.
//!
//! Every function here is a pure function of the state it is given: no
//! cache access, no side effects. The demo binary calls these on each
//! subscription notification; tests call them directly.

use crate::cache::{InfiniteState, MutationState, MutationStatus, QueryState, QueryStatus};
use crate::models::{Page, User};

/// Render the full user list view.
///
/// Loading with no prior data shows the indicator; an error replaces the
/// list with its message; success lists every user with a fetched-age
/// footer and marks an in-flight revalidation.
pub fn render_user_list(state: &QueryState<Vec<User>>) -> String {
    match state.status {
        QueryStatus::Idle => "Users: (not loaded)".to_string(),
        QueryStatus::Loading => "Loading users...".to_string(),
        QueryStatus::Error => format!(
            "Error: {}",
            state.error.as_deref().unwrap_or("unknown error")
        ),
        QueryStatus::Success => {
            let mut out = String::from("User List\n");
            if state.is_fetching {
                out.push_str("(refreshing...)\n");
            }
            if let Some(users) = &state.data {
                for user in users.iter() {
                    out.push_str(&format!("  - {}\n", user.display_line()));
                }
            }
            out.push_str(&format!("fetched {}", state.age_display()));
            out
        }
    }
}

/// Render the infinitely-scrollable list: all fetched pages in fetch
/// order, then the load-more control in its current state.
pub fn render_user_pages(state: &InfiniteState<Page>) -> String {
    match state.status {
        QueryStatus::Idle => "Users: (not loaded)".to_string(),
        QueryStatus::Loading => "Loading users...".to_string(),
        QueryStatus::Error => format!(
            "Error: {}",
            state.error.as_deref().unwrap_or("unknown error")
        ),
        QueryStatus::Success => {
            let mut out = String::from("User List (paged)\n");
            for (i, page) in state.pages.iter().enumerate() {
                out.push_str(&format!("  Page {}:\n", i + 1));
                for user in &page.users {
                    out.push_str(&format!("    - {}\n", user.display_line()));
                }
            }
            let control = if state.is_fetching {
                "[loading more...]"
            } else if state.has_next_page() {
                "[Load More]"
            } else {
                "[no more users]"
            };
            out.push_str(control);
            out
        }
    }
}

/// Render the add-user form state. Errors render as the demo's stand-in
/// for a blocking alert.
pub fn render_add_user(state: &MutationState<User>) -> String {
    match state.status {
        MutationStatus::Idle => "Add a user: [Submit]".to_string(),
        MutationStatus::Pending => "Adding user...".to_string(),
        MutationStatus::Success => match &state.result {
            Some(user) => format!("Added {}", user.display_line()),
            None => "Added user".to_string(),
        },
        MutationStatus::Error => format!(
            "Alert: failed to add user: {}",
            state.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

// ============================================================================
// Control predicates
// ============================================================================

/// The refetch button is disabled while a fetch is in flight.
pub fn refetch_enabled<T>(state: &QueryState<T>) -> bool {
    !state.is_fetching
}

/// The submit button is disabled while the mutation is pending.
pub fn submit_enabled<O>(state: &MutationState<O>) -> bool {
    state.status != MutationStatus::Pending
}

/// The load-more button is disabled when no further page exists or a
/// fetch is already in flight.
pub fn load_more_enabled<P>(state: &InfiniteState<P>) -> bool {
    !state.is_fetching && state.has_next_page()
}

// ============================================================================
// Tests
// ============================================================================
