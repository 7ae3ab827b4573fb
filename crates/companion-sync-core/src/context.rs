//! Context synchronizer
//!
//! Holds this device's copy of the shared snapshot: the authoritative content
//! on the primary, the mirror on the companion.
//!
//! ## Delivery model
//!
//! ```text
//! push ──► update_shared_context ──► (transport coalesces) ──► peer on_receive
//!   │                                                               │
//!   │  several pushes before the peer reads collapse to the last    │
//!   │  failed handoff: logged, dropped, no retry queue              │
//!   ▼                                                               ▼
//! last_pushed                                 mirror overwritten wholesale
//! ```
//!
//! Receipt is last-writer-wins by *arrival order*. Timestamps are carried on
//! the wire but never compared on receipt.

use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::session::PeerSession;
use crate::transport::{Delivery, DropReason, Transport};
use crate::types::{ContextSnapshot, Payload, SnapshotClock};

/// Local copy of the shared snapshot plus push bookkeeping
#[derive(Debug, Default)]
pub struct ContextSynchronizer {
    current: ContextSnapshot,
    last_pushed: Option<ContextSnapshot>,
    clock: SnapshotClock,
    received: u64,
}

impl ContextSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The local snapshot (authoritative content or mirror)
    pub fn current(&self) -> &ContextSnapshot {
        &self.current
    }

    pub(crate) fn current_mut(&mut self) -> &mut ContextSnapshot {
        &mut self.current
    }

    /// Last snapshot accepted by the transport
    pub fn last_pushed(&self) -> Option<&ContextSnapshot> {
        self.last_pushed.as_ref()
    }

    /// Number of snapshots applied from the peer
    pub fn received_count(&self) -> u64 {
        self.received
    }

    /// Replace the local snapshot and push it
    pub fn push(&mut self, session: &PeerSession, snapshot: ContextSnapshot) -> Delivery {
        self.current = snapshot;
        self.push_current(session)
    }

    /// Stamp the local snapshot and hand it to the transport.
    ///
    /// Idempotent: the transport keeps only the latest context, so pushing
    /// the same content twice is harmless.
    pub fn push_current(&mut self, session: &PeerSession) -> Delivery {
        if session.is_inert() {
            debug!("Push skipped: companion sync unsupported");
            return Delivery::Dropped(DropReason::Unsupported);
        }
        if !session.is_activated() {
            warn!(state = %session.state(), "Push dropped: session not activated");
            return Delivery::Dropped(DropReason::NotActivated);
        }

        let timestamp = self.clock.next();
        self.current.set_timestamp(timestamp);
        let payload = match self.current.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "Push dropped: snapshot could not be encoded");
                return Delivery::Dropped(DropReason::Rejected(error.to_string()));
            }
        };

        match session.transport().update_shared_context(payload) {
            Ok(()) => {
                debug!(
                    timestamp,
                    actions = self.current.action_texts().len(),
                    "Pushed shared context"
                );
                self.last_pushed = Some(self.current.clone());
                Delivery::Handed
            }
            Err(error) => {
                warn!(%error, "Push dropped by transport");
                Delivery::Dropped(error.into())
            }
        }
    }

    /// Apply a snapshot from the peer, overwriting every mirrored field.
    ///
    /// A malformed payload leaves the mirror untouched.
    pub fn on_receive(&mut self, payload: &Payload) -> SyncResult<&ContextSnapshot> {
        let snapshot = ContextSnapshot::from_payload(payload)?;
        debug!(
            timestamp = snapshot.timestamp(),
            actions = snapshot.action_texts().len(),
            "Applied shared context"
        );
        self.current = snapshot;
        self.received += 1;
        Ok(&self.current)
    }

    /// Wire payload of the local snapshot, stamped now (for request/reply)
    pub fn reply_payload(&mut self) -> SyncResult<Payload> {
        let timestamp = self.clock.next();
        self.current.set_timestamp(timestamp);
        self.current.to_payload()
    }
}
