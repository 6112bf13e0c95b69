//! flash_search: developer code search.
//!
//! Two engines share the same selectors and result model:
//!
//! - the live scan ([`search::LiveScanner`]) walks a directory tree in parallel and
//!   streams regex matches as they are found;
//! - the line index ([`index::IndexEngine`]) keeps a persistent full-text index of
//!   every line, reconciled incrementally against the file system, and answers
//!   free-text or smart regex queries from it.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod search;
pub mod selector;
pub mod telemetry;
pub mod utils;

pub use error::{Result, SearchError};
pub use index::{IndexEngine, IndexOptions, IndexRun, IndexedResults, ProgressSnapshot};
pub use model::{diff_results, Freshness, MatchPosition, ResultState, SearchResult};
pub use search::{search, LiveScanOptions, LiveScanner, LiveSearch, ScanOutcome};
pub use selector::{
    ContentSelector, FileSelector, FileSelectorConfig, IndexQueryContentSelector,
    IndexQuerySelector, RegexContentSelector, SmartContentSelector,
};
