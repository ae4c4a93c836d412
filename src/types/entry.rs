//! EntryInfo - per-path pairing of the src and copy observations.

use super::operation::{Operation, OperationKind};
use super::path_info::PathInfo;

/// The per-path pairing tracked in the `EntriesIndex`: what the scanner last
/// saw on each side, plus the pending (or just-finished) operation, if any.
#[derive(Debug, Clone, Default)]
pub struct EntryInfo {
    pub src: PathInfo,
    pub copy: PathInfo,
    pub op: Option<Operation>,
}

impl EntryInfo {
    /// An entry requires sync iff the two observations are not
    /// equal-enough-to-skip.
    pub fn requires_sync(&self) -> bool {
        !self.src.equal_enough_to_skip(&self.copy)
    }

    /// Derive the operation kind from the current `(src, copy)` pair,
    /// following the first-matching-row table below.
    pub fn resolve_operation_kind(&self) -> OperationKind {
        let (src, copy) = (&self.src, &self.copy);

        if !src.exists && !copy.exists {
            return OperationKind::None;
        }
        if src.exists && !src.is_dir && !copy.exists {
            return OperationKind::CopyFile;
        }
        if src.exists && src.is_dir && !copy.exists {
            return OperationKind::CopyDir;
        }
        if (!src.exists || src.is_dir) && copy.exists && !copy.is_dir {
            return OperationKind::RemoveFile;
        }
        if !src.exists && copy.exists && copy.is_dir {
            return OperationKind::RemoveDir;
        }
        if src.exists && !src.is_dir && copy.exists && copy.is_dir {
            return OperationKind::ReplaceDirWithFile;
        }
        if src.exists
            && !src.is_dir
            && copy.exists
            && !copy.is_dir
            && (src.size != copy.size || src.mod_time != copy.mod_time)
        {
            return OperationKind::ReplaceFile;
        }

        OperationKind::None
    }
}
