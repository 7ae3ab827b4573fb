//! Core data types for Companion Sync

pub mod completion;
pub mod connectivity;
pub mod payload;
pub mod snapshot;

pub use completion::{ActionState, CompletionEvent};
pub use connectivity::{ConnectivityState, DeviceRole, SessionState};
pub use payload::Payload;
pub use snapshot::{ContextSnapshot, SnapshotClock};
