//! Completion events for action items

use serde::{Deserialize, Serialize};

/// "This action item was (un)completed", keyed by the action's text.
///
/// Transient: applied to whichever side holds the list, never stored.
/// Serializes as the body of a `todoCompletion` message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    /// Identifies the action item (its text)
    #[serde(rename = "todoText")]
    pub action_identifier: String,
    /// New completion flag
    pub is_completed: bool,
}

impl CompletionEvent {
    pub fn new(action_identifier: impl Into<String>, is_completed: bool) -> Self {
        Self {
            action_identifier: action_identifier.into(),
            is_completed,
        }
    }
}

/// Per-item completion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    Ready,
    Done,
}

impl From<bool> for ActionState {
    fn from(completed: bool) -> Self {
        if completed {
            ActionState::Done
        } else {
            ActionState::Ready
        }
    }
}
