//! Scanner - parallel recursive walk of S and C into the EntriesIndex.

mod walk;

pub use walk::{scan_once, ScanOutcome};
