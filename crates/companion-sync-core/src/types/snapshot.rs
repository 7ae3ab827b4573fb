//! The shared state blob pushed wholesale between devices.
//!
//! ## Wire format
//!
//! ```text
//! {
//!   "mentorMessage":        string,
//!   "mentorCharacter":      string,
//!   "actionTodos":          [string, ...],
//!   "todoCompletionStatus": [bool, ...],     // same length as actionTodos
//!   "timestamp":            number           // seconds since epoch
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::payload::{self, Payload};
use crate::error::{SyncError, SyncResult};

/// Payload key for the mentor message text; only snapshots carry it
pub const KEY_MENTOR_MESSAGE: &str = "mentorMessage";

/// Snapshot as it travels on the wire
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotWire {
    mentor_message: String,
    mentor_character: String,
    action_todos: Vec<String>,
    todo_completion_status: Vec<bool>,
    timestamp: f64,
}

/// Mentor message, character and action items with completion flags.
///
/// `action_texts` and `action_completion` always have the same length; every
/// constructor and decoder enforces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    mentor_message: String,
    mentor_character: String,
    action_texts: Vec<String>,
    action_completion: Vec<bool>,
    timestamp: f64,
}

impl ContextSnapshot {
    /// Build a snapshot, rejecting misaligned action lists
    pub fn new(
        mentor_message: impl Into<String>,
        mentor_character: impl Into<String>,
        action_texts: Vec<String>,
        action_completion: Vec<bool>,
        timestamp: f64,
    ) -> SyncResult<Self> {
        if action_texts.len() != action_completion.len() {
            return Err(SyncError::LengthMismatch {
                texts: action_texts.len(),
                flags: action_completion.len(),
            });
        }

        Ok(Self {
            mentor_message: mentor_message.into(),
            mentor_character: mentor_character.into(),
            action_texts,
            action_completion,
            timestamp,
        })
    }

    pub fn mentor_message(&self) -> &str {
        &self.mentor_message
    }

    pub fn mentor_character(&self) -> &str {
        &self.mentor_character
    }

    pub fn action_texts(&self) -> &[String] {
        &self.action_texts
    }

    pub fn action_completion(&self) -> &[bool] {
        &self.action_completion
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Whether there is anything worth pushing
    pub fn is_empty(&self) -> bool {
        self.mentor_message.is_empty()
            && self.mentor_character.is_empty()
            && self.action_texts.is_empty()
    }

    /// Replace the mentor message and character
    pub fn set_mentor(&mut self, message: impl Into<String>, character: impl Into<String>) {
        self.mentor_message = message.into();
        self.mentor_character = character.into();
    }

    /// Replace the action list as a whole
    pub fn set_actions(&mut self, texts: Vec<String>, completion: Vec<bool>) -> SyncResult<()> {
        if texts.len() != completion.len() {
            return Err(SyncError::LengthMismatch {
                texts: texts.len(),
                flags: completion.len(),
            });
        }
        self.action_texts = texts;
        self.action_completion = completion;
        Ok(())
    }

    /// Stamp the snapshot with the time it is handed to the transport
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }

    /// Index of the first action whose text equals `identifier`
    pub fn position_of(&self, identifier: &str) -> Option<usize> {
        self.action_texts.iter().position(|text| text == identifier)
    }

    /// Set a completion flag, returning the previous value
    pub(crate) fn set_completion_at(&mut self, index: usize, completed: bool) -> Option<bool> {
        let flag = self.action_completion.get_mut(index)?;
        Some(std::mem::replace(flag, completed))
    }

    /// Encode as the flat wire payload
    pub fn to_payload(&self) -> SyncResult<Payload> {
        payload::encode(&SnapshotWire {
            mentor_message: self.mentor_message.clone(),
            mentor_character: self.mentor_character.clone(),
            action_todos: self.action_texts.clone(),
            todo_completion_status: self.action_completion.clone(),
            timestamp: self.timestamp,
        })
    }

    /// Decode from the flat wire payload.
    ///
    /// Unknown keys are ignored. Missing or mistyped keys and misaligned
    /// action lists are rejected.
    pub fn from_payload(payload: &Payload) -> SyncResult<Self> {
        let wire: SnapshotWire = payload::decode(payload)?;
        Self::new(
            wire.mentor_message,
            wire.mentor_character,
            wire.action_todos,
            wire.todo_completion_status,
            wire.timestamp,
        )
    }
}

/// Issues snapshot timestamps that never go backwards, even if the wall clock does
#[derive(Debug, Clone, Default)]
pub struct SnapshotClock {
    last_issued: f64,
}

impl SnapshotClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current wall-clock seconds, clamped to the last issued value
    pub fn next(&mut self) -> f64 {
        self.next_from(now_seconds())
    }

    pub(crate) fn next_from(&mut self, wall_clock: f64) -> f64 {
        if wall_clock > self.last_issued {
            self.last_issued = wall_clock;
        }
        self.last_issued
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
