//! Companion Sync Core Library
//!
//! Keeps a journaling app and its paired companion device consistent about
//! one small shared blob: the mentor message, the mentor character, and the
//! day's action items with their completion flags.
//!
//! ## Overview
//!
//! Exactly two endpoints take part. The primary owns the journal content and
//! pushes whole snapshots; the companion mirrors them. Completion toggles can
//! start on either side and travel as small point messages, merged by action
//! text. The transport between the two is eventual, coalescing and often
//! unreachable, so every failed delivery is logged and superseded by the next
//! one instead of being queued.
//!
//! ## Quick Start
//!
//! ```ignore
//! use companion_sync_core::{CompanionEngine, EngineConfig, LoopbackTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (primary_end, companion_end) = LoopbackTransport::pair();
//!
//!     let primary = CompanionEngine::spawn(primary_end, EngineConfig::primary())?;
//!     let companion = CompanionEngine::spawn(companion_end, EngineConfig::companion())?;
//!     primary.set_up().await?;
//!     companion.set_up().await?;
//!
//!     primary.update_mentor_message("Small steps count.", "Sage").await?;
//!     primary
//!         .update_action_todos(vec!["walk".into(), "drink water".into()], vec![false, false])
//!         .await?;
//!
//!     // The companion toggles; the primary merges and re-pushes
//!     companion.set_completion("walk", true).await?;
//!     Ok(())
//! }
//! ```

pub mod completion;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports
pub use completion::{CompletionBridge, MergeOutcome};
pub use config::EngineConfig;
pub use context::ContextSynchronizer;
pub use dispatch::{Dispatcher, PointMessage};
pub use engine::{CompanionEngine, EngineHandle, EngineStats, ToggleOutcome};
pub use error::{SyncError, SyncResult};
pub use events::{ObservedState, SyncEvent};
pub use handlers::{weak_callback, weak_reply, HandlerSet};
pub use session::{PeerSession, SetupOutcome};
pub use transport::{
    Delivery, DropReason, LoopbackTransport, ReplyHandler, Transport, TransportDelegate,
    TransportError,
};
pub use types::*;
