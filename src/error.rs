use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Unable to find directory {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("Failed to open index directory: {0}")]
    IndexDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexing worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    pub(crate) fn invalid_regex(pattern: &str, source: regex::Error) -> Self {
        Self::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        }
    }
}
