//! Value types shared by the live scan and the indexed query paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::utils::file_timestamp;

/// A half-open span within a line, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchPosition {
    pub begin: usize,
    pub length: usize,
}

impl MatchPosition {
    pub fn new(begin: usize, length: usize) -> Self {
        Self { begin, length }
    }

    /// Byte offset one past the end of the span.
    pub fn end(&self) -> usize {
        self.begin + self.length
    }
}

/// One matching line, produced by either engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    pub line_content: String,
    /// Spans ordered by `begin`, non-overlapping
    pub matches: Vec<MatchPosition>,
    /// Last-write ticks of the file when the line was indexed (`None` for live scans)
    pub last_indexed_timestamp: Option<i64>,
}

/// How a result relates to the file currently on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Produced by a live scan; always reflects the file as it was read.
    Live,
    /// Indexed timestamp equals the file's current last-write time.
    Current,
    /// The file changed after it was indexed.
    Stale,
    /// The file no longer exists.
    Missing,
}

impl SearchResult {
    pub fn new(
        path: impl Into<PathBuf>,
        line_number: usize,
        line_content: impl Into<String>,
        matches: Vec<MatchPosition>,
    ) -> Self {
        Self {
            path: path.into(),
            line_number,
            line_content: line_content.into(),
            matches,
            last_indexed_timestamp: None,
        }
    }

    pub fn with_last_indexed(mut self, ticks: i64) -> Self {
        self.last_indexed_timestamp = Some(ticks);
        self
    }

    /// Compare the indexed timestamp against the file's current last-write time.
    pub fn freshness(&self) -> Freshness {
        let Some(indexed) = self.last_indexed_timestamp else {
            return Freshness::Live;
        };
        match file_timestamp(&self.path) {
            Ok(current) if current == indexed => Freshness::Current,
            Ok(_) => Freshness::Stale,
            Err(_) => Freshness::Missing,
        }
    }

    /// Text segments of the line split into (text, is_match) pairs, for highlighting.
    pub fn segments(&self) -> Vec<(&str, bool)> {
        let line = self.line_content.as_str();
        let mut segments = Vec::with_capacity(self.matches.len() * 2 + 1);
        let mut cursor = 0;
        for m in &self.matches {
            // Spans are produced against this exact line, but stale index rows may not line up.
            let (Some(before), Some(matched)) = (
                line.get(cursor..m.begin),
                line.get(m.begin..m.end().min(line.len())),
            ) else {
                continue;
            };
            if !before.is_empty() {
                segments.push((before, false));
            }
            if !matched.is_empty() {
                segments.push((matched, true));
            }
            cursor = m.end().min(line.len());
        }
        if cursor < line.len() {
            segments.push((&line[cursor..], false));
        }
        segments
    }

    fn key(&self) -> (&Path, usize) {
        (self.path.as_path(), self.line_number)
    }
}

/// State of a result when a query is re-run after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Added,
    Removed,
    Unchanged,
}

/// Classify results of a re-run query against the results of the previous run.
///
/// Results are keyed by (path, line number). Entries of `after` come first in their
/// original order, followed by the entries of `before` that disappeared.
pub fn diff_results(
    before: &[SearchResult],
    after: &[SearchResult],
) -> Vec<(SearchResult, ResultState)> {
    let before_keys: HashSet<(&Path, usize)> = before.iter().map(SearchResult::key).collect();
    let after_keys: HashSet<(&Path, usize)> = after.iter().map(SearchResult::key).collect();

    let mut changes: Vec<(SearchResult, ResultState)> = after
        .iter()
        .map(|r| {
            let state = if before_keys.contains(&r.key()) {
                ResultState::Unchanged
            } else {
                ResultState::Added
            };
            (r.clone(), state)
        })
        .collect();

    changes.extend(
        before
            .iter()
            .filter(|r| !after_keys.contains(&r.key()))
            .map(|r| (r.clone(), ResultState::Removed)),
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn result(path: &str, line: usize) -> SearchResult {
        SearchResult::new(path, line, "content", vec![MatchPosition::new(0, 7)])
    }

    #[test]
    fn test_segments_split_matches() {
        let r = SearchResult::new(
            "a.txt",
            2,
            "bar baz",
            vec![MatchPosition::new(0, 3), MatchPosition::new(4, 3)],
        );
        assert_eq!(r.segments(), vec![("bar", true), (" ", false), ("baz", true)]);
    }

    #[test]
    fn test_segments_trailing_text() {
        let r = SearchResult::new("a.txt", 1, "foo bar", vec![MatchPosition::new(0, 3)]);
        assert_eq!(r.segments(), vec![("foo", true), (" bar", false)]);
    }

    #[test]
    fn test_segments_ignore_out_of_range_spans() {
        let r = SearchResult::new("a.txt", 1, "foo", vec![MatchPosition::new(10, 3)]);
        assert_eq!(r.segments(), vec![("foo", false)]);
    }

    #[test]
    fn test_freshness() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "hello").unwrap();
        let ticks = file_timestamp(&path).unwrap();

        let live = SearchResult::new(&path, 1, "hello", vec![]);
        assert_eq!(live.freshness(), Freshness::Live);

        let current = live.clone().with_last_indexed(ticks);
        assert_eq!(current.freshness(), Freshness::Current);

        let stale = live.clone().with_last_indexed(ticks - 1);
        assert_eq!(stale.freshness(), Freshness::Stale);

        fs::remove_file(&path).unwrap();
        assert_eq!(current.freshness(), Freshness::Missing);
    }

    #[test]
    fn test_diff_results() {
        let before = vec![result("a.rs", 1), result("a.rs", 5), result("b.rs", 2)];
        let after = vec![result("a.rs", 1), result("c.rs", 3)];

        let diff = diff_results(&before, &after);
        let states: Vec<(String, usize, ResultState)> = diff
            .iter()
            .map(|(r, s)| (r.path.to_string_lossy().to_string(), r.line_number, *s))
            .collect();

        assert_eq!(
            states,
            vec![
                ("a.rs".to_string(), 1, ResultState::Unchanged),
                ("c.rs".to_string(), 3, ResultState::Added),
                ("a.rs".to_string(), 5, ResultState::Removed),
                ("b.rs".to_string(), 2, ResultState::Removed),
            ]
        );
    }
}
