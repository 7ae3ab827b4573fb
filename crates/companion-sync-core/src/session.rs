//! Peer session state machine
//!
//! Tracks activation of the platform session and the connectivity of the
//! companion.
//!
//! ```text
//! Unactivated ──set_up()──► Activating ──activation complete──► Activated
//!      ▲                        ▲                                  │
//!      │ (unsupported:          └──────── session deactivated ─────┘
//!      │  stays here forever)              (re-activate)
//! ```
//!
//! While `Activated`, the paired / installed / reachable fields toggle
//! independently without leaving the state. Errors here are routine (no
//! companion nearby) and are logged, never propagated.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportDelegate, TransportError};
use crate::types::{ConnectivityState, SessionState};

/// Result of a `set_up` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// First setup: delegate bound and activation requested
    Activating,
    /// Already set up: delegate binding replaced, no second activation
    Rebound,
    /// Hardware has no peer-session support; the engine stays inert
    Unsupported,
}

/// Owner of the single platform session handle
pub struct PeerSession {
    transport: Arc<dyn Transport>,
    state: SessionState,
    connectivity: Option<ConnectivityState>,
    set_up: bool,
    inert: bool,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("state", &self.state)
            .field("connectivity", &self.connectivity)
            .field("set_up", &self.set_up)
            .field("inert", &self.inert)
            .finish()
    }
}

impl PeerSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: SessionState::Unactivated,
            connectivity: None,
            set_up: false,
            inert: false,
        }
    }

    /// Bind `delegate` and, the first time only, activate the session.
    ///
    /// A repeated call swaps the binding atomically (the transport holds one
    /// delegate slot) and logs that the session is already active.
    pub fn set_up(&mut self, delegate: Arc<dyn TransportDelegate>) -> SetupOutcome {
        if self.inert || !self.transport.is_supported() {
            self.inert = true;
            warn!("Peer sessions are not supported on this device; companion sync disabled");
            return SetupOutcome::Unsupported;
        }

        self.transport.set_delegate(delegate);

        if self.set_up {
            info!(state = %self.state, "Session already set up; replaced handler binding");
            return SetupOutcome::Rebound;
        }

        self.set_up = true;
        self.state = SessionState::Activating;
        info!("Activating peer session");
        self.transport.activate();
        SetupOutcome::Activating
    }

    /// Activation finished. Always moves to `Activated`, even on error.
    pub fn on_activation_complete(
        &mut self,
        state: ConnectivityState,
        error: Option<&TransportError>,
    ) -> ConnectivityState {
        self.state = SessionState::Activated;
        self.connectivity = Some(state);

        match error {
            Some(error) => warn!(%error, connectivity = %state, "Session activated with error"),
            None => info!(connectivity = %state, "Session activated"),
        }

        state
    }

    /// Re-read connectivity after a reachability signal
    pub fn on_reachability_changed(&mut self, reported: bool) -> ConnectivityState {
        let fresh = self.transport.connectivity();
        if fresh.is_reachable != reported {
            debug!(
                reported,
                read = fresh.is_reachable,
                "Reachability changed again before it was read"
            );
        }
        debug!(connectivity = %fresh, "Reachability changed");
        self.connectivity = Some(fresh);
        fresh
    }

    /// Peer is handing off to another paired unit; nothing to do
    pub fn on_session_inactive(&self) {
        info!("Session became inactive (companion handoff in progress)");
    }

    /// Handoff complete: this session is stale, activate a fresh one
    pub fn on_session_deactivated(&mut self) {
        if self.inert {
            return;
        }
        info!("Session deactivated; re-activating");
        self.state = SessionState::Activating;
        self.transport.activate();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connectivity(&self) -> Option<ConnectivityState> {
        self.connectivity
    }

    pub fn is_set_up(&self) -> bool {
        self.set_up
    }

    /// True once setup found the platform unsupported
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    pub fn is_activated(&self) -> bool {
        self.state == SessionState::Activated
    }

    /// Activated and the last connectivity read says the peer is reachable
    pub fn is_reachable(&self) -> bool {
        self.is_activated() && self.connectivity.map(|c| c.is_reachable).unwrap_or(false)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
