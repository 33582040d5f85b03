use thiserror::Error;

use super::QueryKey;

#[derive(Error, Debug)]
pub enum CacheError {
    /// A key was registered at one payload type and requested at another.
    #[error("query key '{0}' is already registered with a different payload type")]
    KeyTypeMismatch(QueryKey),

    /// The cache entry was dropped while a subscriber waited for an update.
    #[error("query cache dropped while waiting for an update")]
    Closed,
}
