use serde::{Deserialize, Serialize};

use super::User;

/// One contiguous slice of the user store, as produced by the paginated
/// fetcher. `next_page_token` is the start offset of the following page,
/// or `None` once the store is exhausted.
///
/// Pages are concatenated in fetch order by the cache and are never
/// reordered or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub users: Vec<User>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<u32>,
}

impl Page {
    /// IDs of the users on this page, in store order.
    pub fn ids(&self) -> Vec<i64> {
        self.users.iter().map(|u| u.id).collect()
    }
}
