//! Per-device JSONL logging.
//!
//! A primary and a companion usually run side by side while debugging a
//! sync problem. Each device writes its own file so the two streams never
//! interleave, and the files can be merged by timestamp afterwards.
//!
//! ```text
//! logs/
//! └── raw/                              # one file per device per day
//!     ├── 2026-10-15_primary.jsonl
//!     └── 2026-10-15_companion.jsonl
//! ```
//!
//! ```ignore
//! use companion_sync_core::logging::JsonlLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let layer = JsonlLayer::new("./logs", "primary")?;
//! tracing_subscriber::registry()
//!     .with(layer)
//!     .with(tracing_subscriber::fmt::layer())
//!     .init();
//! ```
//!
//! Merged timeline of dropped deliveries:
//!
//! ```bash
//! cat logs/raw/*.jsonl | jq -s 'sort_by(.ts) | .[] | select(.msg | test("dropped"))'
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::DeviceLogEntry;
pub use layer::JsonlLayer;
pub use writer::{read_device_entries, DeviceLogWriter};
