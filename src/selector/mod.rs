//! Selectors decide which files are searched and which parts of a line match.
//!
//! File selectors are conjunctions of path rules. Content selectors produce match
//! spans, and the ones that implement [`IndexQuerySelector`] can also drive the
//! line index.

pub mod content;
pub mod file;
pub mod smart_query;

pub use content::{
    ContentSelector, IndexQueryContentSelector, IndexQuerySelector, RegexContentSelector,
    SmartContentSelector,
};
pub use file::{FileSelector, FileSelectorConfig};
pub use smart_query::derive_index_query;
