//! Transport adapter contract
//!
//! The engine never talks to a platform session API directly. It depends on
//! the [`Transport`] trait for outbound calls and receives lifecycle and data
//! callbacks through a single [`TransportDelegate`] binding.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Transport (outbound, implemented by the platform adapter)      │
//! │  ├── activate() / is_supported() / connectivity()               │
//! │  ├── send_message(payload, reply?)     point messages           │
//! │  ├── update_shared_context(payload)    coalesced snapshots      │
//! │  └── set_delegate(delegate)            replaces, never layers   │
//! │                                                                 │
//! │  TransportDelegate (inbound, implemented by the engine shim)    │
//! │  ├── on_activation_complete / on_reachability_changed           │
//! │  ├── on_message_received / on_context_received                  │
//! │  └── on_session_inactive / on_session_deactivated               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks may arrive on any thread; implementations of the delegate must
//! only hand them off to the owning context.

pub mod loopback;

use std::sync::Arc;

use thiserror::Error;

use crate::types::{ConnectivityState, Payload};

pub use loopback::LoopbackTransport;

/// Callback invoked with the peer's reply to a point message.
///
/// `FnOnce`: a reply is delivered at most once.
pub type ReplyHandler = Box<dyn FnOnce(Payload) + Send + 'static>;

/// Failures reported by the transport adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The platform has no peer-session support on this hardware
    #[error("peer sessions are not supported on this device")]
    NotSupported,

    /// The session has not finished activating
    #[error("session is not activated")]
    NotActivated,

    /// The companion cannot receive immediate messages right now
    #[error("companion is not reachable")]
    NotReachable,

    /// The platform refused the payload or the call
    #[error("rejected by transport: {0}")]
    Rejected(String),
}

/// Outcome of handing a snapshot or point message to the transport.
///
/// Dropped deliveries are routine (companion away, session still
/// activating) and are superseded by the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the transport
    Handed,
    /// Not handed over; nothing was queued
    Dropped(DropReason),
}

impl Delivery {
    pub fn is_handed(&self) -> bool {
        matches!(self, Delivery::Handed)
    }
}

/// Why a delivery was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Platform has no peer sessions
    Unsupported,
    /// `set_up` has not run or activation has not completed
    NotActivated,
    /// Peer cannot take immediate messages
    NotReachable,
    /// Only the authoritative side pushes snapshots
    NotAuthoritative,
    /// Transport refused the payload
    Rejected(String),
}

impl From<TransportError> for DropReason {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::NotSupported => DropReason::Unsupported,
            TransportError::NotActivated => DropReason::NotActivated,
            TransportError::NotReachable => DropReason::NotReachable,
            TransportError::Rejected(reason) => DropReason::Rejected(reason),
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Unsupported => write!(f, "unsupported"),
            DropReason::NotActivated => write!(f, "session not activated"),
            DropReason::NotReachable => write!(f, "companion not reachable"),
            DropReason::NotAuthoritative => write!(f, "not the authoritative device"),
            DropReason::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Outbound half of the platform peer-session API
pub trait Transport: Send + Sync {
    /// Whether peer sessions exist on this hardware at all
    fn is_supported(&self) -> bool;

    /// Request session activation; completion arrives via the delegate
    fn activate(&self);

    /// Read paired/installed/reachable together from one session query
    fn connectivity(&self) -> ConnectivityState;

    /// Bind the delegate, replacing any previous binding
    fn set_delegate(&self, delegate: Arc<dyn TransportDelegate>);

    /// Deliver a point message immediately; requires a reachable peer
    fn send_message(
        &self,
        payload: Payload,
        reply: Option<ReplyHandler>,
    ) -> Result<(), TransportError>;

    /// Replace the shared context; delivery is eventual and coalesced
    fn update_shared_context(&self, payload: Payload) -> Result<(), TransportError>;
}

/// Inbound callbacks from the platform peer-session API
pub trait TransportDelegate: Send + Sync {
    fn on_activation_complete(&self, state: ConnectivityState, error: Option<TransportError>);

    fn on_reachability_changed(&self, reachable: bool);

    fn on_message_received(&self, payload: Payload, reply: Option<ReplyHandler>);

    fn on_context_received(&self, payload: Payload);

    /// The peer is mid-handoff to another paired unit
    fn on_session_inactive(&self);

    /// Handoff finished; this session instance is stale until re-activated
    fn on_session_deactivated(&self);
}
