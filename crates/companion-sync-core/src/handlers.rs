//! Registered callback bindings
//!
//! The engine keeps exactly one [`HandlerSet`]. Registering a handler
//! replaces the previous one for that slot; handlers never accumulate, so a
//! reconfigured owner is not invoked twice for one event.
//!
//! Callbacks that must not keep their registrant alive can be built with
//! [`weak_callback`] / [`weak_reply`]: once the registrant is dropped the
//! callback silently does nothing.

use std::sync::{Arc, Weak};

use tracing::trace;

use crate::transport::ReplyHandler;
use crate::types::{CompletionEvent, ConnectivityState, Payload};

/// Invoked with every freshly read connectivity snapshot
pub type ConnectivityHandler = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

/// Invoked when a completion event from the peer has been merged
pub type CompletionHandler = Arc<dyn Fn(CompletionEvent) + Send + Sync>;

/// The live connectivity-changed and completion-received bindings
#[derive(Clone, Default)]
pub struct HandlerSet {
    connectivity: Option<ConnectivityHandler>,
    completion: Option<CompletionHandler>,
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("connectivity", &self.connectivity.is_some())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the connectivity binding. Returns true if one was replaced.
    pub fn set_connectivity(&mut self, handler: Option<ConnectivityHandler>) -> bool {
        std::mem::replace(&mut self.connectivity, handler).is_some()
    }

    /// Replace the completion binding. Returns true if one was replaced.
    pub fn set_completion(&mut self, handler: Option<CompletionHandler>) -> bool {
        std::mem::replace(&mut self.completion, handler).is_some()
    }

    pub fn has_connectivity(&self) -> bool {
        self.connectivity.is_some()
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    pub fn notify_connectivity(&self, state: ConnectivityState) {
        if let Some(handler) = &self.connectivity {
            handler(state);
        }
    }

    pub fn notify_completion(&self, event: CompletionEvent) {
        if let Some(handler) = &self.completion {
            handler(event);
        }
    }
}

/// Build a callback holding only a weak reference to `owner`.
///
/// After `owner` is dropped the callback is a no-op.
pub fn weak_callback<T, A, F>(owner: &Arc<T>, f: F) -> Arc<dyn Fn(A) + Send + Sync>
where
    T: Send + Sync + 'static,
    A: 'static,
    F: Fn(&T, A) + Send + Sync + 'static,
{
    let weak: Weak<T> = Arc::downgrade(owner);
    Arc::new(move |arg: A| match weak.upgrade() {
        Some(owner) => f(owner.as_ref(), arg),
        None => trace!("Callback registrant dropped; ignoring"),
    })
}

/// Build a reply handler holding only a weak reference to `owner`
pub fn weak_reply<T, F>(owner: &Arc<T>, f: F) -> ReplyHandler
where
    T: Send + Sync + 'static,
    F: FnOnce(&T, Payload) + Send + 'static,
{
    let weak: Weak<T> = Arc::downgrade(owner);
    Box::new(move |reply: Payload| match weak.upgrade() {
        Some(owner) => f(owner.as_ref(), reply),
        None => trace!("Reply registrant dropped; ignoring"),
    })
}
