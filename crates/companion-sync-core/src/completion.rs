//! Completion feedback bridge
//!
//! Merges `(action identifier, completed)` events into the local action list.
//! Events are keyed by identifier, never by position, and applied in arrival
//! order: a late `ready` after `done` wins, because the transport gives no
//! ordering guarantee between the snapshot and point-message channels.
//!
//! An identifier missing from the local list is dropped. The list's
//! composition belongs to the authoritative side; the bridge only flips flags.

use tracing::{debug, warn};

use crate::dispatch::PointMessage;
use crate::types::{ActionState, CompletionEvent, ContextSnapshot};

/// Result of merging one completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Flag written at `index`; `changed` is false if it already had the value
    Applied { index: usize, changed: bool },
    /// No action with that identifier; nothing written
    UnknownIdentifier,
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }
}

/// Applies completion events and builds outbound ones
#[derive(Debug, Default)]
pub struct CompletionBridge {
    applied: u64,
    unknown: u64,
}

impl CompletionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events merged
    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    /// Number of events dropped for an unknown identifier
    pub fn unknown_count(&self) -> u64 {
        self.unknown
    }

    /// Set the completion flag of the first action matching the identifier
    pub fn merge(&mut self, snapshot: &mut ContextSnapshot, event: &CompletionEvent) -> MergeOutcome {
        let Some(index) = snapshot.position_of(&event.action_identifier) else {
            warn!(
                identifier = %event.action_identifier,
                actions = snapshot.action_texts().len(),
                "Completion for unknown action dropped"
            );
            self.unknown += 1;
            return MergeOutcome::UnknownIdentifier;
        };

        let previous = snapshot
            .set_completion_at(index, event.is_completed)
            .unwrap_or(event.is_completed);
        let changed = previous != event.is_completed;
        self.applied += 1;

        debug!(
            identifier = %event.action_identifier,
            index,
            from = ?ActionState::from(previous),
            to = ?ActionState::from(event.is_completed),
            "Merged completion"
        );

        MergeOutcome::Applied { index, changed }
    }

    /// The point message announcing a local completion to the peer
    pub fn outbound(event: CompletionEvent) -> PointMessage {
        PointMessage::TodoCompletion(event)
    }
}
