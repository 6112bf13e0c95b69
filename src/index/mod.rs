//! Persistent line index with incremental reconciliation.

pub mod engine;
pub mod indexed_search;
pub mod progress;
pub mod query;
mod reconcile;
pub mod schema;

pub use engine::{IndexEngine, IndexOptions, IndexRun};
pub use indexed_search::IndexedResults;
pub use progress::ProgressSnapshot;
pub use query::FreeTextQuery;
pub use schema::StoredLine;
