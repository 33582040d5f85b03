//! Mutations: a single write operation wrapped in an observable
//! Idle/Pending/Success/Error machine.
//!
//! On success a caller-supplied hook runs before the state settles; the
//! demo uses it to invalidate the list key so the new record shows up via
//! the background refetch. On error the message is surfaced and neither
//! the store nor the cache is touched.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fetch::FetchError;

use super::Subscription;

/// Lifecycle of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// Observable state of one mutation.
#[derive(Debug)]
pub struct MutationState<O> {
    pub status: MutationStatus,
    pub result: Option<Arc<O>>,
    pub error: Option<String>,
}

impl<O> MutationState<O> {
    fn idle() -> Self {
        Self {
            status: MutationStatus::Idle,
            result: None,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
}

impl<O> Default for MutationState<O> {
    fn default() -> Self {
        Self::idle()
    }
}

// Manual impl: `Arc<O>` clones without `O: Clone`.
impl<O> Clone for MutationState<O> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

type MutationOp<I, O> =
    Box<dyn Fn(I) -> BoxFuture<'static, Result<O, FetchError>> + Send + Sync>;
type SuccessHook<O> = Box<dyn Fn(&O) + Send + Sync>;

/// A write operation with observable state. Clone is cheap; clones share
/// the state machine, so a form and its submit button see one lifecycle.
pub struct Mutation<I, O> {
    inner: Arc<MutationInner<I, O>>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MutationInner<I, O> {
    op: MutationOp<I, O>,
    on_success: Mutex<Option<SuccessHook<O>>>,
    tx: watch::Sender<MutationState<O>>,
}

impl<I, O: Send + Sync + 'static> Mutation<I, O> {
    pub fn new<F>(op: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, FetchError>> + Send + Sync + 'static,
    {
        let (tx, _rx) = watch::channel(MutationState::idle());
        Self {
            inner: Arc::new(MutationInner {
                op: Box::new(op),
                on_success: Mutex::new(None),
                tx,
            }),
        }
    }

    /// Install the side effect run after a successful operation, before the
    /// state settles to `Success`. Replaces any previous hook.
    pub fn on_success<C>(self, hook: C) -> Self
    where
        C: Fn(&O) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> MutationState<O> {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription<MutationState<O>> {
        Subscription::new(self.inner.tx.subscribe())
    }

    /// Run the operation.
    ///
    /// A trigger while one is already pending is rejected and returns the
    /// pending state unchanged; the submit control is disabled then anyway.
    pub async fn mutate(&self, input: I) -> MutationState<O> {
        let became_owner = self.inner.tx.send_if_modified(|state| {
            if state.status == MutationStatus::Pending {
                return false;
            }
            state.status = MutationStatus::Pending;
            state.error = None;
            true
        });

        if !became_owner {
            debug!("mutation already pending; trigger ignored");
            return self.state();
        }

        match (self.inner.op)(input).await {
            Ok(output) => {
                if let Some(hook) = self
                    .inner
                    .on_success
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                {
                    hook(&output);
                }
                self.inner.tx.send_modify(|state| {
                    state.status = MutationStatus::Success;
                    state.result = Some(Arc::new(output));
                    state.error = None;
                });
            }
            Err(err) => {
                warn!(error = %err, "mutation failed");
                self.inner.tx.send_modify(|state| {
                    state.status = MutationStatus::Error;
                    state.error = Some(err.to_string());
                });
            }
        }

        self.state()
    }
}

// ============================================================================
// Tests
// ============================================================================
