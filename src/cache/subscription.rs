use tokio::sync::watch;

use super::CacheError;

/// A per-key state-change subscription.
///
/// The cache publishes every state change for a key; the presentation layer
/// holds a `Subscription` and re-renders on each notification. Dropping a
/// subscription never cancels an in-flight fetch.
pub struct Subscription<S> {
    rx: watch::Receiver<S>,
}

impl<S: Clone> Subscription<S> {
    pub(crate) fn new(rx: watch::Receiver<S>) -> Self {
        Self { rx }
    }

    /// The latest published state, marking it seen.
    pub fn current(&mut self) -> S {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next state change and return it.
    ///
    /// Errors with `CacheError::Closed` once the cache entry is gone.
    pub async fn changed(&mut self) -> Result<S, CacheError> {
        self.rx.changed().await.map_err(|_| CacheError::Closed)?;
        Ok(self.current())
    }
}
