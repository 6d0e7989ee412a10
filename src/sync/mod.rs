//! Sync module for offline-first clients
//!
//! Provides:
//! - Per-owner version ceiling
//! - Incremental pull of everything stamped after a version
//! - Batch push with last-write-wins conflict detection
//!
//! # Sync Protocol
//!
//! 1. Client asks for `/sync/version` to see whether anything changed
//! 2. Client pulls with `since` set to the last `server_version` it stored
//! 3. Client pushes local edits; new items carry id 0
//! 4. Each pushed item comes back as created, updated, deleted, conflict or error
//! 5. On conflict the server copy is kept and the client should pull again
//!
//! # Conflict Rule
//!
//! The server wins only when its copy is both newer in time and newer in
//! version than what the client last saw, and the pushed content differs.

mod assemble;
mod conflict;
mod reader;
mod types;

pub use assemble::partition;
pub use conflict::{is_conflict, ConflictResolver};
pub use reader::{SyncReader, SyncSnapshot};
pub use types::{
    BatchSyncRequest, BatchSyncResponse, CategorySyncItem, EntityKind, PullRequest, PullResponse,
    SettingsSyncItem, SyncAction, SyncResult, TodoSyncItem, VersionResponse,
};
