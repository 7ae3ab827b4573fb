//! Engine events and the observable state
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ObservedState: read-only fields for presentation code          │
//! │  ├── mentor_message / mentor_character                          │
//! │  ├── action_todos / todo_completion_status                      │
//! │  └── connectivity / session                                     │
//! │                                                                 │
//! │  SyncEvent: notifications about sync activity                   │
//! │  ├── ConnectivityChanged / SessionStateChanged                  │
//! │  ├── ContextPushed / ContextApplied / PushDropped               │
//! │  ├── CompletionMerged / CompletionDropped                       │
//! │  └── MessageSent / MessageDropped / MessageRejected             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the engine task writes `ObservedState`. Each write is followed by a
//! `SyncEvent` so observers can re-read without polling.

use std::fmt;

use crate::transport::DropReason;
use crate::types::{CompletionEvent, ConnectivityState, ContextSnapshot, SessionState};

/// Snapshot of what the presentation layer may display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedState {
    pub mentor_message: String,
    pub mentor_character: String,
    pub action_todos: Vec<String>,
    pub todo_completion_status: Vec<bool>,
    /// `None` until the first activation completes
    pub connectivity: Option<ConnectivityState>,
    pub session: SessionState,
    /// Timestamp of the snapshot last pushed or applied
    pub last_timestamp: Option<f64>,
}

impl ObservedState {
    /// Copy all content fields from `snapshot`
    pub fn apply_snapshot(&mut self, snapshot: &ContextSnapshot) {
        self.mentor_message = snapshot.mentor_message().to_string();
        self.mentor_character = snapshot.mentor_character().to_string();
        self.action_todos = snapshot.action_texts().to_vec();
        self.todo_completion_status = snapshot.action_completion().to_vec();
        if snapshot.timestamp() > 0.0 {
            self.last_timestamp = Some(snapshot.timestamp());
        }
    }

    /// Completion flag of the first action with this text
    pub fn completion_of(&self, action: &str) -> Option<bool> {
        self.action_todos
            .iter()
            .position(|text| text == action)
            .and_then(|index| self.todo_completion_status.get(index).copied())
    }

    /// Number of completed actions
    pub fn completed_count(&self) -> usize {
        self.todo_completion_status.iter().filter(|done| **done).count()
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connectivity = self
            .connectivity
            .map(|state| state.label())
            .unwrap_or("unknown");
        writeln!(f, "session:      {} ({})", self.session, connectivity)?;
        writeln!(
            f,
            "mentor:       {} says {:?}",
            self.mentor_character, self.mentor_message
        )?;
        write!(
            f,
            "actions:      {}/{} done",
            self.completed_count(),
            self.action_todos.len()
        )?;
        for (text, done) in self.action_todos.iter().zip(&self.todo_completion_status) {
            write!(f, "\n  [{}] {}", if *done { "x" } else { " " }, text)?;
        }
        Ok(())
    }
}

/// Events emitted by the engine task
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A freshly read connectivity snapshot was published
    ConnectivityChanged(ConnectivityState),
    /// The session moved between activation states
    SessionStateChanged(SessionState),
    /// The local snapshot was handed to the transport
    ContextPushed {
        /// Stamp of the pushed snapshot
        timestamp: f64,
    },
    /// A push was not handed over
    PushDropped(DropReason),
    /// A snapshot from the peer overwrote the mirror
    ContextApplied {
        timestamp: f64,
        actions: usize,
    },
    /// A completion event was merged into the local list
    CompletionMerged {
        event: CompletionEvent,
        /// Whether the flag actually flipped
        changed: bool,
        /// Whether it came from the peer (false for a local toggle)
        remote: bool,
    },
    /// A completion event named no known action
    CompletionDropped(CompletionEvent),
    /// A point message was handed to the transport
    MessageSent {
        kind: &'static str,
    },
    /// A point message was not handed over
    MessageDropped {
        kind: &'static str,
        reason: DropReason,
    },
    /// An inbound payload could not be used
    MessageRejected {
        /// Why it was rejected
        message: String,
    },
}
