//! dirsync - one-way directory mirroring engine.
//!
//! Given a source tree and a copy tree, the scan→diff→schedule→execute
//! pipeline makes the copy tree a faithful mirror of the source tree by
//! issuing a minimal set of filesystem operations.

pub mod config;
pub mod controller;
pub mod executor;
pub mod index;
pub mod logging;
pub mod scanner;
pub mod scheduler;
pub mod signals;
pub mod types;

pub use types::{EntryInfo, Operation, OperationKind, OperationStatus, PathInfo, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
