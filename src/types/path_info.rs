//! PathInfo - observation of one filesystem position

use std::path::PathBuf;
use std::time::SystemTime;

/// An observation of one filesystem position, taken from either the source
/// or the copy tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub exists: bool,
    pub full_path: PathBuf,
    pub is_dir: bool,
    /// Bytes; 0 when absent or a directory.
    pub size: u64,
    pub mod_time: SystemTime,
}

impl PathInfo {
    /// The zero-value observation: absent, with an empty path.
    pub fn absent() -> Self {
        Self {
            exists: false,
            full_path: PathBuf::new(),
            is_dir: false,
            size: 0,
            mod_time: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn dir(full_path: PathBuf) -> Self {
        Self {
            exists: true,
            full_path,
            is_dir: true,
            size: 0,
            mod_time: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn file(full_path: PathBuf, size: u64, mod_time: SystemTime) -> Self {
        Self {
            exists: true,
            full_path,
            is_dir: false,
            size,
            mod_time,
        }
    }

    /// Two observations are equal-enough-to-skip when either both are
    /// absent, both exist as directories, or both exist as regular files
    /// with identical `is_dir`, `size` and `mod_time`.
    pub fn equal_enough_to_skip(&self, other: &PathInfo) -> bool {
        if !self.exists && !other.exists {
            return true;
        }
        if !self.exists || !other.exists {
            return false;
        }
        if self.is_dir && other.is_dir {
            return true;
        }
        !self.is_dir
            && !other.is_dir
            && self.size == other.size
            && self.mod_time == other.mod_time
    }
}

impl Default for PathInfo {
    fn default() -> Self {
        Self::absent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn both_absent_are_equal_enough() {
        assert!(PathInfo::absent().equal_enough_to_skip(&PathInfo::absent()));
    }

    #[test]
    fn one_absent_one_present_differ() {
        let present = PathInfo::dir(PathBuf::from("/a"));
        assert!(!PathInfo::absent().equal_enough_to_skip(&present));
        assert!(!present.equal_enough_to_skip(&PathInfo::absent()));
    }

    #[test]
    fn two_dirs_are_equal_enough_regardless_of_mtime() {
        let a = PathInfo::dir(PathBuf::from("/a"));
        let mut b = PathInfo::dir(PathBuf::from("/b"));
        b.mod_time = SystemTime::UNIX_EPOCH + Duration::from_secs(99);
        assert!(a.equal_enough_to_skip(&b));
    }

    #[test]
    fn files_with_same_size_and_mtime_are_equal_enough() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let a = PathInfo::file(PathBuf::from("/a"), 5, t);
        let b = PathInfo::file(PathBuf::from("/b"), 5, t);
        assert!(a.equal_enough_to_skip(&b));
    }

    #[test]
    fn files_differing_in_size_require_sync() {
        let t = SystemTime::UNIX_EPOCH;
        let a = PathInfo::file(PathBuf::from("/a"), 5, t);
        let b = PathInfo::file(PathBuf::from("/b"), 6, t);
        assert!(!a.equal_enough_to_skip(&b));
    }

    #[test]
    fn files_differing_in_mtime_require_sync() {
        let a = PathInfo::file(
            PathBuf::from("/a"),
            5,
            SystemTime::UNIX_EPOCH,
        );
        let b = PathInfo::file(
            PathBuf::from("/b"),
            5,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1),
        );
        assert!(!a.equal_enough_to_skip(&b));
    }

    #[test]
    fn file_vs_dir_require_sync() {
        let file = PathInfo::file(PathBuf::from("/a"), 0, SystemTime::UNIX_EPOCH);
        let dir = PathInfo::dir(PathBuf::from("/a"));
        assert!(!file.equal_enough_to_skip(&dir));
    }
}
