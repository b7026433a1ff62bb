//! Shared infrastructure utilities for lintel.
//!
//! - **`security`**: Redaction of sensitive command-line values before logging
//! - **`snapshot`**: Ephemeral on-disk copies of unsaved editor buffers

pub mod security;
pub mod snapshot;

pub use security::{format_command_for_log, redact_args};
pub use snapshot::{BufferSnapshot, SnapshotError, write_snapshot, write_snapshot_in};
