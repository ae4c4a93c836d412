//! Core type definitions for dirsync

mod entry;
mod error;
mod operation;
mod path_info;

pub use entry::EntryInfo;
pub use error::SyncError;
pub use operation::{Operation, OperationKind, OperationStatus};
pub use path_info::PathInfo;
