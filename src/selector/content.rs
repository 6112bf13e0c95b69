//! Content selectors decide which parts of a line match.

use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use super::smart_query::derive_index_query;
use crate::error::{Result, SearchError};
use crate::index::query::FreeTextQuery;
use crate::model::MatchPosition;

/// Finds the spans of a line that match.
///
/// Implementations are shared read-only across scanning threads.
pub trait ContentSelector: Send + Sync {
    /// Non-overlapping spans ordered by `begin`. Empty when the line does not match.
    fn get_matches(&self, line: &str) -> Vec<MatchPosition>;
}

/// A content selector that can also narrow an index lookup.
pub trait IndexQuerySelector: ContentSelector {
    /// Free-text query understood by the line index.
    fn index_query(&self) -> &str;
}

impl<T: ContentSelector + ?Sized> ContentSelector for Arc<T> {
    fn get_matches(&self, line: &str) -> Vec<MatchPosition> {
        (**self).get_matches(line)
    }
}

impl<T: IndexQuerySelector + ?Sized> IndexQuerySelector for Arc<T> {
    fn index_query(&self) -> &str {
        (**self).index_query()
    }
}

/// Regex matching, case-insensitive unless `match_case` is set.
#[derive(Debug, Clone)]
pub struct RegexContentSelector {
    regex: Regex,
}

impl RegexContentSelector {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_case(pattern, false)
    }

    pub fn with_case(pattern: &str, match_case: bool) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!match_case)
            .build()
            .map_err(|e| SearchError::invalid_regex(pattern, e))?;
        Ok(Self { regex })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl ContentSelector for RegexContentSelector {
    fn get_matches(&self, line: &str) -> Vec<MatchPosition> {
        self.regex
            .find_iter(line)
            .filter(|m| !m.is_empty())
            .map(|m| MatchPosition::new(m.start(), m.len()))
            .collect()
    }
}

/// Matches whatever the index returns for a free-text query; the whole line is
/// reported as one span.
#[derive(Debug, Clone)]
pub struct IndexQueryContentSelector {
    query: String,
}

impl IndexQueryContentSelector {
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        FreeTextQuery::parse(&query)?;
        Ok(Self { query })
    }
}

impl ContentSelector for IndexQueryContentSelector {
    fn get_matches(&self, line: &str) -> Vec<MatchPosition> {
        vec![MatchPosition::new(0, line.len())]
    }
}

impl IndexQuerySelector for IndexQueryContentSelector {
    fn index_query(&self) -> &str {
        &self.query
    }
}

/// Regex precision with index acceleration: the index narrows candidates with a
/// query derived from the pattern and the regex confirms each line.
#[derive(Debug, Clone)]
pub struct SmartContentSelector {
    regex: RegexContentSelector,
    query: String,
}

impl SmartContentSelector {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_case(pattern, false)
    }

    pub fn with_case(pattern: &str, match_case: bool) -> Result<Self> {
        let regex = RegexContentSelector::with_case(pattern, match_case)?;
        let query = derive_index_query(pattern);
        tracing::debug!(pattern, query = %query, "Derived index query");
        Ok(Self { regex, query })
    }

    pub fn pattern(&self) -> &str {
        self.regex.pattern()
    }
}

impl ContentSelector for SmartContentSelector {
    fn get_matches(&self, line: &str) -> Vec<MatchPosition> {
        self.regex.get_matches(line)
    }
}

impl IndexQuerySelector for SmartContentSelector {
    fn index_query(&self) -> &str {
        &self.query
    }
}
