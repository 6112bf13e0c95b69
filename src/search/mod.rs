//! Live scanning and file discovery.

pub mod file_discovery;
pub mod live;

pub use file_discovery::{discover_files, FileDiscoveryIterator};
pub use live::{search, CancelHandle, LiveScanOptions, LiveScanner, LiveSearch, ScanOutcome};
