//! In-memory transport pair
//!
//! Two [`LoopbackTransport`] ends share one link (paired / installed /
//! reachable). Shared-context updates land in a single pending slot on the
//! receiving end, so repeated pushes while the link is down collapse to the
//! latest one and are delivered when it comes back. Point messages need the
//! link to be reachable right now.
//!
//! Used by the integration tests and the CLI simulation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{ReplyHandler, Transport, TransportDelegate, TransportError};
use crate::types::{ConnectivityState, Payload};

/// One end of an in-memory peer session
pub struct LoopbackTransport {
    name: String,
    link: Arc<RwLock<ConnectivityState>>,
    supported: AtomicBool,
    activated: AtomicBool,
    activation_error: Mutex<Option<TransportError>>,
    delegate: RwLock<Option<Arc<dyn TransportDelegate>>>,
    inbound_context: Mutex<Option<Payload>>,
    peer: RwLock<Weak<LoopbackTransport>>,
    activations: AtomicUsize,
    bindings: AtomicUsize,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("name", &self.name)
            .field("link", &*self.link.read())
            .field("activated", &self.activated.load(Ordering::SeqCst))
            .finish()
    }
}

impl LoopbackTransport {
    fn new(name: &str, link: Arc<RwLock<ConnectivityState>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            link,
            supported: AtomicBool::new(true),
            activated: AtomicBool::new(false),
            activation_error: Mutex::new(None),
            delegate: RwLock::new(None),
            inbound_context: Mutex::new(None),
            peer: RwLock::new(Weak::new()),
            activations: AtomicUsize::new(0),
            bindings: AtomicUsize::new(0),
        })
    }

    /// Create two linked ends, paired, installed and reachable
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let link = Arc::new(RwLock::new(ConnectivityState::new(true, true, true)));
        let primary = Self::new("primary", link.clone());
        let companion = Self::new("companion", link);
        *primary.peer.write() = Arc::downgrade(&companion);
        *companion.peer.write() = Arc::downgrade(&primary);
        (primary, companion)
    }

    /// A single end with no peer (never paired)
    pub fn unpaired() -> Arc<Self> {
        Self::new("unpaired", Arc::new(RwLock::new(ConnectivityState::default())))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model hardware without peer-session support
    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// Make the next activation complete with `error`
    pub fn fail_next_activation(&self, error: TransportError) {
        *self.activation_error.lock() = Some(error);
    }

    /// Toggle reachability for both ends and notify their delegates.
    ///
    /// Coming back into reach delivers any held shared context.
    pub fn set_reachable(&self, reachable: bool) {
        {
            let mut link = self.link.write();
            if link.is_reachable == reachable {
                return;
            }
            link.is_reachable = reachable;
        }
        debug!(end = %self.name, reachable, "Loopback reachability changed");

        let peer = self.peer.read().upgrade();
        self.notify_reachability(reachable);
        if let Some(peer) = &peer {
            peer.notify_reachability(reachable);
        }

        if reachable {
            self.deliver_pending_context();
            if let Some(peer) = &peer {
                peer.deliver_pending_context();
            }
        }
    }

    /// Overwrite the whole link state without firing callbacks
    pub fn set_link(&self, state: ConnectivityState) {
        *self.link.write() = state;
    }

    /// Simulate a handoff: the session goes inactive, then is deactivated
    pub fn simulate_handoff(&self) {
        self.activated.store(false, Ordering::SeqCst);
        if let Some(delegate) = self.current_delegate() {
            delegate.on_session_inactive();
            delegate.on_session_deactivated();
        }
    }

    /// Number of `activate()` calls received
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Number of `set_delegate()` calls received
    pub fn delegate_bindings(&self) -> usize {
        self.bindings.load(Ordering::SeqCst)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Whether a shared context is waiting to be delivered to this end
    pub fn has_pending_context(&self) -> bool {
        self.inbound_context.lock().is_some()
    }

    fn current_delegate(&self) -> Option<Arc<dyn TransportDelegate>> {
        self.delegate.read().clone()
    }

    fn notify_reachability(&self, reachable: bool) {
        if !self.is_activated() {
            return;
        }
        if let Some(delegate) = self.current_delegate() {
            delegate.on_reachability_changed(reachable);
        }
    }

    fn enqueue_context(&self, payload: Payload) {
        let replaced = self.inbound_context.lock().replace(payload).is_some();
        if replaced {
            trace!(end = %self.name, "Coalesced pending shared context");
        }
        self.deliver_pending_context();
    }

    fn deliver_pending_context(&self) {
        if !self.link.read().is_reachable || !self.is_activated() {
            return;
        }
        let Some(delegate) = self.current_delegate() else {
            return;
        };
        let pending = self.inbound_context.lock().take();
        if let Some(payload) = pending {
            debug!(end = %self.name, "Delivering shared context");
            delegate.on_context_received(payload);
        }
    }

    fn check_ready(&self) -> Result<(), TransportError> {
        if !self.supported.load(Ordering::SeqCst) {
            return Err(TransportError::NotSupported);
        }
        if !self.is_activated() {
            return Err(TransportError::NotActivated);
        }
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
        if !self.is_supported() {
            return;
        }

        self.activated.store(true, Ordering::SeqCst);
        let state = self.connectivity();
        let error = self.activation_error.lock().take();
        if let Some(delegate) = self.current_delegate() {
            delegate.on_activation_complete(state, error);
        }
        self.deliver_pending_context();
    }

    fn connectivity(&self) -> ConnectivityState {
        *self.link.read()
    }

    fn set_delegate(&self, delegate: Arc<dyn TransportDelegate>) {
        self.bindings.fetch_add(1, Ordering::SeqCst);
        *self.delegate.write() = Some(delegate);
    }

    fn send_message(
        &self,
        payload: Payload,
        reply: Option<ReplyHandler>,
    ) -> Result<(), TransportError> {
        self.check_ready()?;
        if !self.link.read().is_reachable {
            return Err(TransportError::NotReachable);
        }

        let peer = self.peer.read().upgrade().ok_or(TransportError::NotReachable)?;
        if !peer.is_activated() {
            return Err(TransportError::NotReachable);
        }
        let delegate = peer.current_delegate().ok_or(TransportError::NotReachable)?;
        delegate.on_message_received(payload, reply);
        Ok(())
    }

    fn update_shared_context(&self, payload: Payload) -> Result<(), TransportError> {
        self.check_ready()?;
        let peer = self
            .peer
            .read()
            .upgrade()
            .ok_or_else(|| TransportError::Rejected("no paired device".to_string()))?;
        peer.enqueue_context(payload);
        Ok(())
    }
}
